fn main() {
    if let Err(e) = cloth_sim::core::Engine::run() {
        eprintln!("Engine failed to start: {}", e);
        std::process::exit(1);
    }
}
