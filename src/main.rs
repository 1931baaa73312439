fn main() {
    if let Err(e) = medroutine::run() {
        eprintln!("{}: {e}", medroutine::config::APP_NAME);
        std::process::exit(1);
    }
}
