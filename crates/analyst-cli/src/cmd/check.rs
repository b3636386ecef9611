use crate::output::print_json;
use analyst_core::sanitize::sanitize;
use analyst_core::validate::validate_with_repair;
use anyhow::Context;
use std::path::Path;

/// Run a script through the same sanitize and validate pipeline generated
/// code goes through before execution.
pub fn run(file: &Path, json: bool) -> anyhow::Result<()> {
    let code = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    let outcome = validate_with_repair(&sanitize(&code));

    if json {
        let value = match &outcome {
            Ok(v) => serde_json::json!({ "valid": true, "repaired": v.repaired, "error": null }),
            Err(e) => serde_json::json!({ "valid": false, "repaired": false, "error": e }),
        };
        print_json(&value)?;
    }

    match outcome {
        Ok(v) => {
            if !json {
                if v.repaired {
                    println!("OK (after line-ending repair): {}", file.display());
                } else {
                    println!("OK: {}", file.display());
                }
            }
            Ok(())
        }
        Err(e) => anyhow::bail!("{} rejected: {e}", file.display()),
    }
}
