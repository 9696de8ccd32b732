fn main() {
    // The Tauri context is only generated for the desktop shell.
    if std::env::var_os("CARGO_FEATURE_DESKTOP").is_some() {
        tauri_build::build()
    }
}
