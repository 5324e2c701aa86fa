fn main() -> std::process::ExitCode {
    daylist_lib::run()
}
