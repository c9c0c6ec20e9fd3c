//! Version reporting.

use crate::error::Result;

/// Print the binary version, with build profile.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn execute(json: bool) -> Result<()> {
    let version = env!("CARGO_PKG_VERSION");
    let profile = if cfg!(debug_assertions) {
        "debug"
    } else {
        "release"
    };

    if json {
        let output = serde_json::json!({
            "name": "llog",
            "version": version,
            "build": profile,
        });
        println!("{}", serde_json::to_string(&output)?);
    } else {
        println!("llog {version} ({profile} build)");
    }
    Ok(())
}
