use base64::prelude::*;
use sha1::Digest;
use std::io::Write;

fn main() {
    if let Err(e) = write_migrations("schemas/") {
        panic!("Failed to generate schema migrations: {e}");
    }
}

/// Emits `migrations.rs`: an array of `(seq, file_name, hash, sql)` tuples,
/// one per `NNNN_name.sql` file, in sequence order.
fn write_migrations(schema_dir: &str) -> Result<(), Box<dyn std::error::Error>> {
    println!("cargo:rerun-if-changed={schema_dir}");

    let pattern = regex::Regex::new(r"^(\d+)_+.+\.sql$")?;
    let mut schemas = Vec::new();
    for entry in std::fs::read_dir(schema_dir)?.flatten() {
        if !entry.file_type().is_ok_and(|t| t.is_file()) {
            continue;
        }
        let file_name = entry.file_name().to_string_lossy().into_owned();
        let Some(seq) = pattern.captures(&file_name).and_then(|c| c.get(1)) else {
            continue;
        };
        let seq: isize = seq.as_str().parse()?;
        schemas.push((seq, entry.path()));
    }
    schemas.sort_by_key(|(seq, _)| *seq);

    if let Some(w) = schemas.windows(2).find(|w| w[0].0 == w[1].0) {
        return Err(format!("Duplicate migration sequence number {}", w[0].0).into());
    }

    let out_path = std::path::Path::new(&std::env::var("OUT_DIR")?).join("migrations.rs");
    let mut out = std::io::BufWriter::new(std::fs::File::create(out_path)?);

    writeln!(out, "[")?;
    for (seq, path) in schemas {
        let sql = std::fs::read_to_string(&path)?;
        let hash = BASE64_STANDARD_NO_PAD.encode(sha1::Sha1::digest(sql.as_bytes()));
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        writeln!(
            out,
            "    ({seq}isize, r###\"{name}\"###, \"{hash}\", r###\"{sql}\"###),"
        )?;
    }
    writeln!(out, "]")?;
    Ok(())
}
