//! Environment readiness check.

use anyhow::Result;
use case_harvest::renderer::chromium::find_chromium;
use std::path::Path;

/// Print Chromium availability and where output would go.
pub fn run(output_root: &Path, database: &Path) -> Result<bool> {
    println!("case-harvest doctor");
    println!("===================");
    println!();
    println!("OS:   {}", std::env::consts::OS);
    println!("Arch: {}", std::env::consts::ARCH);
    println!();

    let chromium = find_chromium();
    match &chromium {
        Some(path) => println!("[OK] Chromium found: {}", path.display()),
        None => println!(
            "[!!] Chromium NOT found. Install Chrome/Chromium or set CASE_HARVEST_CHROMIUM_PATH."
        ),
    }
    println!("[..] Output root: {}", output_root.display());
    match database.parent() {
        Some(dir) if dir.exists() => println!("[OK] Database: {}", database.display()),
        _ => println!("[..] Database (created on first run): {}", database.display()),
    }

    println!();
    let ready = chromium.is_some();
    println!("Status: {}", if ready { "READY" } else { "NOT READY" });
    Ok(ready)
}
