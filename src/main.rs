fn main() -> Result<(), Box<dyn std::error::Error>> {
    manuscript_sync::cli::main()
}
