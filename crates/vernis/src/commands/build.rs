//! Build command - Compile the template tree

use clap::{Args, ValueEnum};
use ignore::WalkBuilder;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use vernis_atelier::{Atelier, BuildStore, CompileOutcome, CompiledTemplate, FsStore, SourceFile};

use crate::config::{load_config, CONFIG_FILE};

#[derive(Debug, Clone, Copy, ValueEnum, Default)]
pub enum OutputFormat {
    /// Only show statistics
    #[default]
    Stats,
    /// Print a JSON report of every compiled template to stdout
    Json,
}

#[derive(Args, Default)]
pub struct BuildArgs {
    /// Project root that all configured paths are relative to (default: current directory)
    #[arg(short, long)]
    pub root: Option<PathBuf>,

    /// Config file (default: <root>/vernis.config.json)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Minify compiled assets (overrides the config file)
    #[arg(long)]
    pub minify: bool,

    /// Build-version tag mixed into fingerprints (overrides the config file)
    #[arg(long)]
    pub version_tag: Option<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "stats")]
    pub format: OutputFormat,
}

#[derive(Debug, Default)]
struct BuildStats {
    fresh: usize,
    cached: usize,
    skipped: usize,
    failed: usize,
}

#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct TemplateReport<'a> {
    cached: bool,
    #[serde(flatten)]
    template: &'a CompiledTemplate,
}

pub fn run(args: BuildArgs) {
    let start = Instant::now();

    let root = args
        .root
        .clone()
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_default());
    let config_path = args.config.clone().unwrap_or_else(|| root.join(CONFIG_FILE));

    let mut options = match load_config(&config_path) {
        Ok(config) => config.compile,
        Err(e) => {
            eprintln!("\x1b[31mError:\x1b[0m {}", e);
            std::process::exit(2);
        }
    };
    if args.minify {
        options.minify = true;
    }
    if let Some(tag) = args.version_tag {
        options.version = tag;
    }

    let template_root = root.join(&options.template_root);
    let suffix = options.template_suffix.clone();

    let mut atelier = match Atelier::new(options, FsStore::new(&root)) {
        Ok(atelier) => atelier,
        Err(e) => {
            eprintln!("\x1b[31mError:\x1b[0m invalid configuration: {}", e);
            std::process::exit(2);
        }
    };

    let files = collect_files(&template_root, &suffix);
    if files.is_empty() {
        eprintln!(
            "No *{} files found under {}",
            suffix,
            template_root.display()
        );
        std::process::exit(1);
    }

    let (stats, outcomes) = compile_all(&mut atelier, &files, &template_root);

    if let OutputFormat::Json = args.format {
        let reports: Vec<TemplateReport<'_>> = outcomes
            .iter()
            .filter_map(|outcome| {
                outcome.template().map(|template| TemplateReport {
                    cached: matches!(outcome, CompileOutcome::Cached(_)),
                    template,
                })
            })
            .collect();
        match serde_json::to_string_pretty(&reports) {
            Ok(json) => println!("{}", json),
            Err(e) => eprintln!("Failed to serialize report: {}", e),
        }
    }

    let elapsed = start.elapsed().as_secs_f64();
    let compiled = stats.fresh + stats.cached;

    if stats.failed > 0 {
        eprintln!(
            "✗ {} file(s) failed, {} compiled ({} fresh, {} cached) in {:.4}s",
            stats.failed, compiled, stats.fresh, stats.cached, elapsed
        );
        std::process::exit(1);
    }

    let file_word = if compiled == 1 { "file" } else { "files" };
    eprintln!(
        "✓ {} {} compiled ({} fresh, {} cached, {} skipped) in {:.4}s",
        compiled, file_word, stats.fresh, stats.cached, stats.skipped, elapsed
    );
}

/// Compile every file in order. A failing file is logged and counted, and
/// the remaining files are still compiled.
fn compile_all<S: BuildStore>(
    atelier: &mut Atelier<S>,
    files: &[PathBuf],
    template_root: &Path,
) -> (BuildStats, Vec<CompileOutcome>) {
    let mut stats = BuildStats::default();
    let mut outcomes = Vec::with_capacity(files.len());

    for path in files {
        let relative = path.strip_prefix(template_root).unwrap_or(path.as_path());

        let file = match fs::read(path) {
            Ok(bytes) => match String::from_utf8(bytes) {
                Ok(text) => SourceFile::new(relative, text),
                Err(_) => SourceFile::without_contents(relative),
            },
            Err(e) => {
                stats.failed += 1;
                tracing::error!(path = %relative.display(), "failed to read template: {}", e);
                continue;
            }
        };

        match atelier.compile(&file) {
            Ok(outcome) => {
                match &outcome {
                    CompileOutcome::Fresh(_) => stats.fresh += 1,
                    CompileOutcome::Cached(_) => stats.cached += 1,
                    CompileOutcome::Skipped => stats.skipped += 1,
                }
                outcomes.push(outcome);
            }
            Err(e) => {
                stats.failed += 1;
                tracing::error!(path = %e.path.display(), "{}", e.kind);
            }
        }
    }

    (stats, outcomes)
}

/// Template files under `root`, sorted for a stable processing order.
fn collect_files(root: &Path, suffix: &str) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkBuilder::new(root)
        .hidden(false)
        .build()
        .flatten()
        .filter(|entry| entry.file_type().is_some_and(|t| t.is_file()))
        .map(|entry| entry.into_path())
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.ends_with(suffix))
        })
        .collect();

    files.sort();
    files
}

#[cfg(test)]
mod tests {
    use super::*;
    use vernis_atelier::CompileOptions;

    #[test]
    fn test_failing_template_does_not_stop_the_build() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let options = CompileOptions::new("js/views", "css/views");
        let template_root = root.join(&options.template_root);
        fs::create_dir_all(&template_root).unwrap();
        fs::write(
            template_root.join("broken.blade.php"),
            "<p></p>\n<script data-scoped>exports.include = ['resources/js/missing.js'];</script>",
        )
        .unwrap();
        fs::write(
            template_root.join("home.blade.php"),
            "<h1>Hi</h1>\n<style data-scoped>h1{color:red}</style>",
        )
        .unwrap();

        let mut atelier = Atelier::new(options, FsStore::new(root)).unwrap();
        let files = collect_files(&template_root, ".blade.php");
        let (stats, outcomes) = compile_all(&mut atelier, &files, &template_root);

        assert_eq!(stats.failed, 1);
        assert_eq!(stats.fresh, 1);
        assert_eq!(outcomes.len(), 1);

        let compiled =
            fs::read_to_string(root.join("storage/vernis/views/home.blade.php")).unwrap();
        assert_eq!(compiled, "<h1>Hi</h1>\n\n@include('home__style')");
        assert!(!root.join("storage/vernis/views/broken.blade.php").exists());
    }

    #[test]
    fn test_second_build_is_cached() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let options = CompileOptions::new("js/views", "css/views");
        let template_root = root.join(&options.template_root);
        fs::create_dir_all(&template_root).unwrap();
        fs::write(template_root.join("a.blade.php"), "<p>a</p>").unwrap();

        let files = collect_files(&template_root, ".blade.php");
        let mut atelier = Atelier::new(options.clone(), FsStore::new(root)).unwrap();
        let (first, _) = compile_all(&mut atelier, &files, &template_root);
        let mut atelier = Atelier::new(options, FsStore::new(root)).unwrap();
        let (second, _) = compile_all(&mut atelier, &files, &template_root);

        assert_eq!((first.fresh, first.cached), (1, 0));
        assert_eq!((second.fresh, second.cached, second.failed), (0, 1, 0));
    }

    #[test]
    fn test_collect_files_filters_by_suffix_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("pages/admin")).unwrap();
        fs::write(root.join("pages/home.blade.php"), "").unwrap();
        fs::write(root.join("pages/admin/users.blade.php"), "").unwrap();
        fs::write(root.join("layout.blade.php"), "").unwrap();
        fs::write(root.join("notes.txt"), "").unwrap();

        let files: Vec<PathBuf> = collect_files(root, ".blade.php")
            .into_iter()
            .map(|p| p.strip_prefix(root).unwrap().to_path_buf())
            .collect();

        assert_eq!(
            files,
            vec![
                PathBuf::from("layout.blade.php"),
                PathBuf::from("pages/admin/users.blade.php"),
                PathBuf::from("pages/home.blade.php"),
            ]
        );
    }
}
