use dotenv::dotenv;

/// Load `.env.local` then `.env` from the working directory. Values already in
/// the process environment win, so the first file to set a key wins too.
pub fn ensure_dotenv() {
    let local = dotenv::from_filename(".env.local").is_ok();
    if dotenv().is_ok() || local {
        return;
    }
    // Fallback to Cargo project root
    let root = env!("CARGO_MANIFEST_DIR");
    let _ = dotenv::from_filename(format!("{root}/.env.local"));
    let _ = dotenv::from_filename(format!("{root}/.env"));
}
