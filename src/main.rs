fn main() -> std::process::ExitCode {
    vigil_lib::run()
}
