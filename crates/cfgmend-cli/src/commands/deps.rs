use super::{json_pretty, EXIT_SUCCESS};
use cfgmend_core::Pipeline;
use cfgmend_schema::{feature_key_for_dependency, PackageName};
use std::path::Path;

pub fn run(package: &str, manifest: &Path, json: bool) -> Result<u8, String> {
    let pipeline = Pipeline::load(manifest).map_err(|e| e.to_string())?;
    let service = pipeline.metadata().map_err(|e| e.to_string())?;
    let tokens = service
        .dependencies(&PackageName::from(package))
        .map_err(|e| format!("metadata error: {e}"))?;

    if json {
        let payload = serde_json::json!({
            "package": package,
            "service": service.name(),
            "dependencies": tokens.iter().map(|t| serde_json::json!({
                "token": t,
                "feature": feature_key_for_dependency(t),
            })).collect::<Vec<_>>(),
        });
        println!("{}", json_pretty(&payload)?);
    } else if tokens.is_empty() {
        println!("{package} has no declared dependencies");
    } else {
        println!("{package} depends on:");
        for t in &tokens {
            match feature_key_for_dependency(t) {
                Some(key) => println!("  {t} -> {key}"),
                None => println!("  {t} (condition, not forced)"),
            }
        }
    }
    Ok(EXIT_SUCCESS)
}
