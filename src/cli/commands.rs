use std::io::{IsTerminal, Read, Write};
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Mutex;

use anyhow::{bail, Context};
use clap::{Parser, ValueEnum};
use tracing::{debug, info};

use go_import_reviser::reviser::STANDARD_INPUT;
use go_import_reviser::{
    process_paths, BatchConfig, DependencyCache, FileCache, FixOptions, GroupOrder,
    ModuleResolver, OutputSink, SourceFile, DEFAULT_IMPORTS_ORDER,
};

const CACHE_DIR_NAME: &str = "go-import-reviser";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputMode {
    /// Write the result back to the file
    File,
    /// Same as `file`; with --list-diff also lists the written files
    Write,
    /// Print the result
    Stdout,
}

#[derive(Parser, Debug)]
#[command(name = "go-import-reviser")]
#[command(about = "Groups, sorts and cleans up Go import declarations")]
#[command(version)]
#[command(after_long_help = r#"
EXAMPLES:
    # Fix one file in place
    go-import-reviser ./main.go

    # Fix a whole module, dropping unused imports
    go-import-reviser --rm-unused ./...

    # List files that need fixing, exit 1 if any
    go-import-reviser --list-diff --set-exit-status ./...

    # Read from stdin, print to stdout
    cat main.go | go-import-reviser -
"#)]
pub struct Cli {
    /// Files or directories to process; `./...` recurses, `-` reads stdin
    #[arg(required_unless_present = "version_only")]
    pub paths: Vec<String>,

    /// Project module path, e.g. github.com/acme/app (default: from go.mod)
    #[arg(long)]
    pub project_name: Option<String>,

    /// Comma separated prefixes of the company import group
    #[arg(long, default_value = "")]
    pub company_prefixes: String,

    /// Where the result goes
    #[arg(long, value_enum, default_value = "file")]
    pub output: OutputMode,

    /// Comma separated globs of files or directories to skip
    #[arg(long, default_value = "")]
    pub excludes: String,

    /// Order of import groups: std, general, company, project, blanked, dotted
    #[arg(long, default_value = DEFAULT_IMPORTS_ORDER)]
    pub imports_order: String,

    /// List files whose imports differ from the fixed form
    #[arg(long)]
    pub list_diff: bool,

    /// Exit with status 1 when a change is needed or made
    #[arg(long)]
    pub set_exit_status: bool,

    /// Descend into subdirectories
    #[arg(long)]
    pub recursive: bool,

    /// Skip files unchanged since the last run
    #[arg(long)]
    pub use_cache: bool,

    /// With --use-cache, compare size and modification time before hashing
    #[arg(long, num_args = 0..=1, require_equals = true, default_missing_value = "true")]
    pub cache_fast_skip: Option<bool>,

    /// Remove unused imports
    #[arg(long)]
    pub rm_unused: bool,

    /// Alias version-suffixed imports, e.g. pg "github.com/go-pg/pg/v9"
    #[arg(long)]
    pub set_alias: bool,

    /// Normalize blank lines around the import block
    #[arg(long)]
    pub format: bool,

    /// Put aliased imports after the others within each group
    #[arg(long)]
    pub separate_named: bool,

    /// Also process files marked `// Code generated`
    #[arg(long)]
    pub apply_to_generated_files: bool,

    /// Print only the version string
    #[arg(long)]
    pub version_only: bool,
}

impl Cli {
    pub fn fix_options(&self) -> anyhow::Result<FixOptions> {
        let order = GroupOrder::parse(&self.imports_order)?;
        Ok(FixOptions {
            remove_unused: self.rm_unused,
            set_alias: self.set_alias,
            format: self.format,
            separate_named: self.separate_named,
            apply_to_generated: self.apply_to_generated_files,
            ..FixOptions::default()
        }
        .with_company_prefixes(&self.company_prefixes)
        .with_group_order(order))
    }

    pub fn output_sink(&self) -> OutputSink {
        match (self.list_diff, self.output) {
            (true, OutputMode::Write) => OutputSink::WriteAndList,
            (true, _) => OutputSink::ListOnly,
            (false, OutputMode::Stdout) => OutputSink::Stdout,
            (false, _) => OutputSink::WriteFile,
        }
    }

    fn cache(&self) -> anyhow::Result<Option<FileCache>> {
        if !self.use_cache {
            if self.cache_fast_skip == Some(true) {
                bail!("--cache-fast-skip requires --use-cache");
            }
            return Ok(None);
        }
        let dir = cache_dir()?;
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create cache directory {}", dir.display()))?;
        debug!(dir = %dir.display(), "using cache");
        Ok(Some(
            FileCache::new(dir).with_metadata(self.cache_fast_skip.unwrap_or(true)),
        ))
    }
}

/// `$XDG_CACHE_HOME/go-import-reviser`, else `$HOME/.cache/go-import-reviser`.
fn cache_dir() -> anyhow::Result<PathBuf> {
    if let Some(xdg) = std::env::var_os("XDG_CACHE_HOME").filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(xdg).join(CACHE_DIR_NAME));
    }
    match std::env::var_os("HOME").filter(|v| !v.is_empty()) {
        Some(home) => Ok(PathBuf::from(home).join(".cache").join(CACHE_DIR_NAME)),
        None => bail!("Failed to determine cache directory: neither XDG_CACHE_HOME nor HOME is set"),
    }
}

/// Runs the command line; returns whether anything changed.
pub fn run(cli: &Cli) -> anyhow::Result<bool> {
    if cli.version_only {
        println!("{}", env!("CARGO_PKG_VERSION"));
        return Ok(false);
    }

    let options = cli.fix_options()?;
    let resolver = ModuleResolver::new();
    let deps = DependencyCache::with_go_list();

    if cli.paths.len() == 1 && cli.paths[0] == STANDARD_INPUT {
        return fix_stdin(cli, &options, &resolver, &deps);
    }

    let config = BatchConfig {
        project_name: cli.project_name.clone(),
        recursive: cli.recursive,
        excludes: cli.excludes.clone(),
        output: cli.output_sink(),
        cache: cli.cache()?,
    };
    info!(paths = ?cli.paths, "starting");

    let out = Mutex::new(std::io::stdout());
    let cancel = AtomicBool::new(false);
    let changed = process_paths(&cli.paths, &config, &options, &resolver, &deps, &out, &cancel)?;
    Ok(changed)
}

fn fix_stdin(
    cli: &Cli,
    options: &FixOptions,
    resolver: &ModuleResolver,
    deps: &DependencyCache,
) -> anyhow::Result<bool> {
    let mut stdin = std::io::stdin();
    if stdin.is_terminal() {
        bail!("no data on stdin");
    }
    let mut source = Vec::new();
    stdin.read_to_end(&mut source).context("Failed to read stdin")?;

    let cwd = std::env::current_dir().context("Failed to get current directory")?;
    let project = resolver
        .determine_project_name(cli.project_name.as_deref(), &cwd)
        .context("Could not determine project name for stdin")?;

    let outcome = SourceFile::new(project, cwd).fix_source(source, options, deps)?;

    let mut stdout = std::io::stdout().lock();
    stdout.write_all(&outcome.content)?;
    stdout.flush()?;
    Ok(outcome.changed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("go-import-reviser").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_defaults() {
        let cli = parse(&["main.go"]);
        assert_eq!(cli.output_sink(), OutputSink::WriteFile);
        let options = cli.fix_options().unwrap();
        assert_eq!(options.group_order, GroupOrder::default());
        assert!(!options.remove_unused);
        assert!(cli.cache().unwrap().is_none());
    }

    #[test]
    fn test_output_sinks() {
        assert_eq!(parse(&["--output", "stdout", "a.go"]).output_sink(), OutputSink::Stdout);
        assert_eq!(parse(&["--list-diff", "a.go"]).output_sink(), OutputSink::ListOnly);
        assert_eq!(
            parse(&["--list-diff", "--output", "write", "a.go"]).output_sink(),
            OutputSink::WriteAndList
        );
    }

    #[test]
    fn test_feature_flags() {
        let cli = parse(&[
            "--rm-unused",
            "--set-alias",
            "--format",
            "--separate-named",
            "--apply-to-generated-files",
            "--company-prefixes",
            "github.com/acme,gitlab.acme.io",
            "./...",
        ]);
        let options = cli.fix_options().unwrap();
        assert!(options.remove_unused && options.set_alias && options.format);
        assert!(options.separate_named && options.apply_to_generated);
        assert_eq!(options.company_prefixes, vec!["github.com/acme", "gitlab.acme.io"]);
    }

    #[test]
    fn test_bad_imports_order() {
        let cli = parse(&["--imports-order", "std,general", "a.go"]);
        assert!(cli.fix_options().is_err());
    }

    #[test]
    fn test_cache_fast_skip_requires_cache() {
        let cli = parse(&["--cache-fast-skip", "a.go"]);
        assert!(cli.cache().is_err());

        let cli = parse(&["--cache-fast-skip=false", "a.go"]);
        assert!(cli.cache().unwrap().is_none());
    }

    #[test]
    fn test_cache_fast_skip_keeps_following_path() {
        let cli = parse(&["--cache-fast-skip", "a.go"]);
        assert_eq!(cli.cache_fast_skip, Some(true));
        assert_eq!(cli.paths, vec!["a.go".to_string()]);

        let cli = parse(&["--use-cache", "--cache-fast-skip", "false"]);
        assert_eq!(cli.cache_fast_skip, Some(true));
        assert_eq!(cli.paths, vec!["false".to_string()]);
    }

    #[test]
    fn test_paths_required() {
        assert!(Cli::try_parse_from(["go-import-reviser"]).is_err());
        assert!(Cli::try_parse_from(["go-import-reviser", "--version-only"]).is_ok());
    }
}
