use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::{json, Map, Value as Json};
use sf3::format::{self, FormatId, View};
use sf3::io::{self, OpenMode, Sf3File};
use sf3::verify::{self, VerifyOptions};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sf3", about = "Inspect and validate SF3 files")]
struct Cli {
    /// More log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check identifier, structure, size and checksum of one or more files
    Verify {
        #[arg(required = true, num_args = 1..)]
        files: Vec<PathBuf>,
        /// Only walk the structure; skip the checksum and size checks
        #[arg(long)]
        structural: bool,
    },
    /// Describe the contents of a file
    Info {
        input: PathBuf,
        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },
    /// Report the format from the identifier alone
    Tell {
        input: PathBuf,
    },
    /// List the known formats
    Formats,
}

#[derive(Serialize)]
struct Summary {
    path:      String,
    format:    &'static str,
    mime_type: &'static str,
    size:      usize,
    /// `None` when the file verifies, otherwise the failure.
    problem:   Option<String>,
    details:   Map<String, Json>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {

        // ── Verify ───────────────────────────────────────────────────────────
        Commands::Verify { files, structural } => {
            let options = if structural { VerifyOptions::structural() } else { VerifyOptions::default() };
            let results = verify_all(&files, &options);

            let mut failed = 0usize;
            for (path, result) in files.iter().zip(results) {
                match result {
                    Ok(id) => println!("  ok      {} ({})", path.display(), id.name()),
                    Err(e) => {
                        failed += 1;
                        println!("  FAILED  {}: {}", path.display(), e);
                    }
                }
            }
            if failed > 0 {
                eprintln!("{} of {} file(s) failed verification", failed, files.len());
                std::process::exit(1);
            }
        }

        // ── Info ─────────────────────────────────────────────────────────────
        Commands::Info { input, json } => {
            let file = Sf3File::open(&input, OpenMode::Read)?;
            let view = file.view()?;
            let summary = Summary {
                path:      input.display().to_string(),
                format:    file.format_id().name(),
                mime_type: file.format_id().mime_type(),
                size:      view.size(),
                problem:   file.verify().err().map(|e| e.to_string()),
                details:   describe(&view)?,
            };

            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                print_summary(&summary);
            }
        }

        // ── Tell ─────────────────────────────────────────────────────────────
        Commands::Tell { input } => {
            let id = io::tell(&input)?;
            if let Some(named) = input.to_str().and_then(FormatId::from_suffix) {
                if named != id {
                    log::warn!("{} has a .{} suffix but holds {} data",
                        input.display(), named.suffix(), format::kind_name(id as u8));
                }
            }
            println!("{}  {:#04x}  {}  {}  .{}",
                input.display(), id as u8, id.name(), id.mime_type(), id.suffix());
        }

        // ── Formats ──────────────────────────────────────────────────────────
        Commands::Formats => {
            println!("{:>4}  {:<16} {:<28} Suffix", "Id", "Name", "MIME type");
            for id in FormatId::ALL {
                println!("{:>4}  {:<16} {:<28} .{}", id as u8, id.name(), id.mime_type(), id.suffix());
            }
        }
    }

    Ok(())
}

// ── Helpers ──────────────────────────────────────────────────────────────────

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_writer(std::io::stderr)
        .init();
}

fn verify_one(path: &Path, options: &VerifyOptions) -> sf3::Result<FormatId> {
    let data = std::fs::read(path)?;
    verify::verify_with(&data, options)
}

fn verify_all(files: &[PathBuf], options: &VerifyOptions) -> Vec<sf3::Result<FormatId>> {
    #[cfg(feature = "parallel")]
    {
        use rayon::prelude::*;

        files.par_iter().map(|path| verify_one(path, options)).collect()
    }

    #[cfg(not(feature = "parallel"))]
    {
        files.iter().map(|path| verify_one(path, options)).collect()
    }
}

fn timestamp(secs: i64) -> Json {
    match DateTime::<Utc>::from_timestamp(secs, 0) {
        Some(t) => Json::String(t.to_rfc3339()),
        None    => Json::from(secs),
    }
}

/// Per-format fields for `info`.
fn describe(view: &View<'_>) -> sf3::Result<Map<String, Json>> {
    let details = match view {
        View::Archive(a) => {
            let members: Vec<Json> = a.entries().map(|(meta, file)| json!({
                "path":      meta.path,
                "mime_type": meta.mime_type,
                "modified":  timestamp(meta.modtime),
                "size":      file.len(),
                "checksum":  format!("{:08x}", meta.checksum),
            })).collect();
            json!({ "files": a.count(), "members": members })
        }
        View::Audio(a) => json!({
            "samplerate":    a.samplerate(),
            "channels":      a.channels(),
            "sample_format": a.format().name(),
            "frames":        a.frame_count(),
            "duration_secs": a.duration(),
        }),
        View::Image(i) => json!({
            "width":        i.width(),
            "height":       i.height(),
            "depth":        i.depth(),
            "channels":     i.channels().name(),
            "pixel_format": format!("{:?}", i.format()),
        }),
        View::Log(l) => {
            let end = if l.is_open() { Json::from("open") } else { timestamp(l.end()) };
            json!({
                "start":   timestamp(l.start()),
                "end":     end,
                "chunks":  l.chunk_count(),
                "entries": l.entry_count(),
            })
        }
        View::Model(m) => {
            let attributes: Vec<&str> = m.vertex_format().attributes().map(|a| a.name()).collect();
            let mut textures = Vec::new();
            for (i, path) in m.textures().enumerate() {
                let path = path?;
                let material = m.texture_material(i).map(|t| t.name()).unwrap_or("unknown");
                textures.push(json!({ "material": material, "path": path }));
            }
            json!({
                "attributes": attributes,
                "vertices":   m.vertex_count(),
                "indices":    m.faces().len(),
                "textures":   textures,
            })
        }
        View::PhysicsModel(p) => {
            let shapes = p.shapes()
                .map(|s| s.map(|s| s.kind.shape_type().name()))
                .collect::<sf3::Result<Vec<_>>>()?;
            json!({ "mass": p.mass(), "tensor": p.tensor(), "shapes": shapes })
        }
        View::Table(t) => {
            let columns = t.columns()
                .map(|c| c.map(|c| json!({
                    "name":   c.name,
                    "type":   c.column_type.name(),
                    "length": c.length,
                })))
                .collect::<sf3::Result<Vec<_>>>()?;
            json!({ "rows": t.row_count(), "row_length": t.row_length(), "columns": columns })
        }
        View::Text(t) => {
            let markup = t.markup()
                .map(|m| m.map(|m| format!("{}..{} {}", m.start, m.end, m.option.name())))
                .collect::<sf3::Result<Vec<_>>>()?;
            json!({ "characters": t.text().chars().count(), "markup": markup })
        }
        View::VectorGraphic(v) => {
            let instructions = v.instructions()
                .map(|i| i.map(|i| format!("{:?}", i.kind())))
                .collect::<sf3::Result<Vec<_>>>()?;
            json!({ "width": v.width(), "height": v.height(), "instructions": instructions })
        }
    };

    match details {
        Json::Object(map) => Ok(map),
        _                 => Ok(Map::new()),
    }
}

fn print_summary(summary: &Summary) {
    println!("── SF3 {} ─────────────────────────────────────────", summary.format);
    println!("  {:<14} {}", "Path", summary.path);
    println!("  {:<14} {}", "MIME type", summary.mime_type);
    println!("  {:<14} {} B", "Size", summary.size);
    match &summary.problem {
        None    => println!("  {:<14} ok", "Verified"),
        Some(e) => println!("  {:<14} {}", "Verified", e),
    }
    for (key, value) in &summary.details {
        match value {
            Json::Array(items) => {
                println!("  {:<14} ({})", key, items.len());
                for item in items {
                    println!("    {}", plain(item));
                }
            }
            other => println!("  {:<14} {}", key, plain(other)),
        }
    }
}

fn plain(value: &Json) -> String {
    match value {
        Json::String(s) => s.clone(),
        other           => other.to_string(),
    }
}
