use super::{json_pretty, EXIT_SUCCESS};
use cfgmend_schema::{merge_layers, Layer};
use std::path::{Path, PathBuf};

pub fn run(layers: &[PathBuf], output: Option<&Path>, json: bool) -> Result<u8, String> {
    let layers: Vec<Layer> = layers
        .iter()
        .enumerate()
        .map(|(i, p)| Layer::from_path(p, i as u32))
        .collect();
    let merged = merge_layers(&layers).map_err(|e| format!("layer error: {e}"))?;

    if let Some(path) = output {
        merged
            .snapshot
            .write_to_file(path)
            .map_err(|e| format!("failed to write {}: {e}", path.display()))?;
    }

    if json {
        let payload = serde_json::json!({
            "applied": merged.applied,
            "entries": merged.snapshot.len(),
            "required": merged.required,
            "warnings": merged
                .warnings
                .iter()
                .map(|w| format!("{}: {}", w.layer, w.error))
                .collect::<Vec<_>>(),
            "output": output.map(|p| p.display().to_string()),
            "config": if output.is_none() { Some(merged.snapshot.serialize()) } else { None },
        });
        println!("{}", json_pretty(&payload)?);
        return Ok(EXIT_SUCCESS);
    }

    match output {
        Some(path) => {
            println!(
                "merged {} layers into {} ({} entries)",
                merged.applied.len(),
                path.display(),
                merged.snapshot.len()
            );
            println!("required features ({}):", merged.required.len());
            for key in merged.required.iter() {
                println!("  {key}");
            }
        }
        None => print!("{}", merged.snapshot.serialize()),
    }
    for w in &merged.warnings {
        eprintln!("warning: layer '{}': {}", w.layer, w.error);
    }
    Ok(EXIT_SUCCESS)
}
