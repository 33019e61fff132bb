pub fn main() -> std::process::ExitCode {
    pyreasm::run()
}
