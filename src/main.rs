use anyhow::Result;
use clap::Parser;
use codescout::advisor::{CompletionBackend, OpenRouterBackend};
use codescout::{AnalysisConfig, Diagnostic, DiagnosticPipeline, Severity, SourceFragment};
use futures::future::join_all;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

#[derive(Parser, Debug)]
#[command(
    name = "codescout",
    about = "Heuristic error detection for Python source, with an optional LLM deep pass",
    version
)]
struct Args {
    /// File or directory to analyze (defaults to current directory)
    #[arg(default_value = ".")]
    path: PathBuf,

    /// Enable the LLM advisor pass (requires OPENROUTER_API_KEY)
    #[arg(long)]
    llm: bool,

    /// Emit diagnostics as JSON instead of human-readable text
    #[arg(long)]
    json: bool,

    /// Override the per-file diagnostic cap from the config
    #[arg(long)]
    max: Option<usize>,
}

const IGNORE_DIRS: &[&str] = &[
    ".git",
    "node_modules",
    "target",
    "vendor",
    "dist",
    "build",
    ".next",
    "__pycache__",
    ".venv",
    "venv",
];

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = AnalysisConfig::load();
    if let Some(max) = args.max {
        config.max_diagnostics = max;
    }
    config.validate()?;

    let mut pipeline = DiagnosticPipeline::new(config);
    if args.llm {
        let backend = OpenRouterBackend::new();
        if !backend.is_available() {
            eprintln!("  Warning: OPENROUTER_API_KEY is not set; running heuristics only");
        }
        pipeline = pipeline.with_advisor(Arc::new(backend));
    }
    let pipeline = Arc::new(pipeline);

    let files = collect_python_files(&args.path)?;
    if files.is_empty() {
        eprintln!("No Python files found under {}", args.path.display());
        return Ok(());
    }

    let mut tasks = Vec::with_capacity(files.len());
    for path in files {
        let pipeline = Arc::clone(&pipeline);
        tasks.push(tokio::spawn(async move {
            let content = match fs::read_to_string(&path) {
                Ok(content) => content,
                Err(err) => {
                    eprintln!("  Warning: could not read {}: {}", path.display(), err);
                    return (path, Vec::new());
                }
            };
            let fragment =
                SourceFragment::new(content, "python", path.to_string_lossy().into_owned());
            let diagnostics = pipeline.analyze(&fragment).await;
            (path, diagnostics)
        }));
    }

    let mut results: Vec<(PathBuf, Vec<Diagnostic>)> = Vec::with_capacity(tasks.len());
    for task in join_all(tasks).await {
        match task {
            Ok(result) => results.push(result),
            Err(err) => eprintln!("  Warning: analysis task failed: {}", err),
        }
    }
    results.sort_by(|a, b| a.0.cmp(&b.0));

    let mut has_errors = false;
    if args.json {
        let report: Vec<serde_json::Value> = results
            .iter()
            .map(|(path, diagnostics)| {
                serde_json::json!({
                    "file": path.to_string_lossy(),
                    "diagnostics": diagnostics,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&report)?);
        has_errors = results
            .iter()
            .any(|(_, ds)| ds.iter().any(|d| d.severity >= Severity::Error));
    } else {
        let mut total = 0;
        for (path, diagnostics) in &results {
            if diagnostics.is_empty() {
                continue;
            }
            println!("{}", path.display());
            for d in diagnostics {
                // Positions are 0-based internally, 1-based for humans.
                println!(
                    "  {}:{} {} [{}] {}",
                    d.line + 1,
                    d.column + 1,
                    d.severity.label(),
                    d.rule_id,
                    d.message
                );
                if let Some(suggestion) = &d.suggestion {
                    println!("      suggestion: {}", suggestion);
                }
                if d.severity >= Severity::Error {
                    has_errors = true;
                }
                total += 1;
            }
        }
        if total == 0 {
            println!("No issues found.");
        } else {
            println!(
                "\n{} issue{} in {} file{}",
                total,
                if total == 1 { "" } else { "s" },
                results.iter().filter(|(_, d)| !d.is_empty()).count(),
                if results.iter().filter(|(_, d)| !d.is_empty()).count() == 1 {
                    ""
                } else {
                    "s"
                }
            );
        }
    }

    if has_errors {
        std::process::exit(1);
    }
    Ok(())
}

fn collect_python_files(root: &Path) -> Result<Vec<PathBuf>> {
    if root.is_file() {
        return Ok(vec![root.to_path_buf()]);
    }
    let mut files = Vec::new();
    for entry in WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        // Depth 0 is the root the user asked for; never filter it.
        .filter_entry(|e| e.depth() == 0 || !should_ignore(e))
    {
        let entry = match entry {
            Ok(e) => e,
            Err(_) => continue,
        };
        if !entry.file_type().is_file() {
            continue;
        }
        if entry.path().extension().and_then(|e| e.to_str()) == Some("py") {
            files.push(entry.path().to_path_buf());
        }
    }
    files.sort();
    Ok(files)
}

fn should_ignore(entry: &walkdir::DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|name| IGNORE_DIRS.contains(&name) || name.starts_with('.'))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_collect_python_files_skips_ignored_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::write(root.join("a.py"), "x = 1\n").unwrap();
        fs::write(root.join("notes.txt"), "not code").unwrap();
        fs::create_dir(root.join("__pycache__")).unwrap();
        fs::write(root.join("__pycache__").join("b.py"), "x = 1\n").unwrap();
        fs::create_dir(root.join("pkg")).unwrap();
        fs::write(root.join("pkg").join("c.py"), "x = 1\n").unwrap();

        let files = collect_python_files(root).unwrap();
        let names: Vec<String> = files
            .iter()
            .map(|p| p.strip_prefix(root).unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.py".to_string(), "pkg/c.py".to_string()]);
    }

    #[test]
    fn test_collect_single_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("solo.py");
        fs::write(&file, "x = 1\n").unwrap();
        assert_eq!(collect_python_files(&file).unwrap(), vec![file]);
    }
}
