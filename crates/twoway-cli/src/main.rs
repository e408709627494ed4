use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use twoway_cache::TemplateCache;
use twoway_core::{Config, Diagnostic, PlaceholderStyle, Report, Severity};
use twoway_eval::{EvaluationOptions, Evaluator, TemplateContext};
use twoway_sql::SqlValidator;
use twoway_template::{Node, Template, TemplateParser};

/// twoway - two-way SQL templates: runnable as written, bindable at runtime
#[derive(Parser)]
#[command(name = "twoway")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file (default: twoway.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a template and print its node tree
    Parse {
        /// Template file
        file: PathBuf,

        /// Print the tree as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the variables a template reads
    Params {
        /// Template file
        file: PathBuf,
    },

    /// Evaluate a template and print SQL plus bind parameters
    Render {
        /// Template file
        file: PathBuf,

        /// JSON file holding one object of variables
        #[arg(long)]
        vars: Option<PathBuf>,

        /// Placeholder style: question, dollar or colon (overrides config)
        #[arg(short, long)]
        placeholder: Option<PlaceholderStyle>,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check templates: structure, and that the raw text is valid SQL
    Check {
        /// Template files or directories (searched for *.sql)
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Output file for report.json
        #[arg(short, long, default_value = "report.json")]
        output: PathBuf,

        /// Also output markdown report
        #[arg(short, long)]
        markdown: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    // Load config if specified
    let config = if let Some(config_path) = &cli.config {
        Config::from_file(config_path)?
    } else if Path::new("twoway.toml").exists() {
        Config::from_file(Path::new("twoway.toml"))?
    } else {
        tracing::debug!("no config file found, using defaults");
        Config::default()
    };

    tracing::debug!(dialect = ?config.dialect, placeholder = ?config.evaluation.placeholder, "config loaded");

    match cli.command {
        Commands::Parse { file, json } => parse_command(&file, json),
        Commands::Params { file } => params_command(&file),
        Commands::Render { file, vars, placeholder, json } => {
            render_command(&config, &file, vars.as_deref(), placeholder, json)
        }
        Commands::Check { paths, output, markdown } => {
            check_command(&config, &paths, &output, markdown.as_deref(), cli.verbose)
        }
    }
}

/// Log to stderr; RUST_LOG wins over `--verbose`
fn init_tracing(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "warn" };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn load_template(parser: &TemplateParser, file: &Path) -> Result<Template> {
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read template {}", file.display()))?;
    let name = file.display().to_string();

    Ok(parser.parse_named(Some(&name), &text)?)
}

/// Parse command - print the node tree
fn parse_command(file: &Path, json: bool) -> Result<()> {
    let template = load_template(&TemplateParser::new(), file)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&template)?);
        return Ok(());
    }

    println!("{} {}", "Template:".bold(), template.id.display_name().green());
    println!("{} {}", "Digest:".bold(), template.id.digest);
    println!();
    print_nodes(&template.nodes, 0);
    Ok(())
}

fn print_nodes(nodes: &[Node], indent: usize) {
    let pad = "  ".repeat(indent);

    for node in nodes {
        match node {
            Node::Literal(literal) => {
                let text = literal.text().trim();
                if !text.is_empty() {
                    println!("{}{} {:?}", pad, "literal".dimmed(), text);
                }
            }
            Node::Conditional(conditional) => {
                println!("{}{}", pad, node.label().cyan());
                print_nodes(&conditional.children, indent + 1);
                for branch in &conditional.else_ifs {
                    let condition = branch.condition.as_ref().map(|c| c.source.as_str()).unwrap_or_default();
                    println!("{}{}", pad, format!("elseif({})@{}", condition, branch.meta.line).cyan());
                    print_nodes(&branch.children, indent + 1);
                }
                if let Some(otherwise) = &conditional.otherwise {
                    println!("{}{}", pad, format!("else@{}", otherwise.meta.line).cyan());
                    print_nodes(&otherwise.children, indent + 1);
                }
            }
            Node::Loop(lp) => {
                println!("{}{}", pad, node.label().cyan());
                print_nodes(&lp.children, indent + 1);
            }
            _ => println!("{}{} {}", pad, node.label().yellow(), node.meta().marker.dimmed()),
        }
    }
}

/// Params command - list harvested parameters
fn params_command(file: &Path) -> Result<()> {
    let template = load_template(&TemplateParser::new(), file)?;

    if template.parameters.is_empty() {
        println!("{}", "No parameters".green());
        return Ok(());
    }

    for parameter in &template.parameters {
        println!("{:<24} {}", parameter.name.bold(), format!("line {}", parameter.line).dimmed());
    }
    Ok(())
}

/// Render command - evaluate against a JSON variables file
fn render_command(
    config: &Config,
    file: &Path,
    vars: Option<&Path>,
    placeholder: Option<PlaceholderStyle>,
    json: bool,
) -> Result<()> {
    let template = load_template(&TemplateParser::new(), file)?;

    let context = match vars {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read variables {}", path.display()))?;
            TemplateContext::from_json_str(&text)
                .with_context(|| format!("{} must hold one JSON object", path.display()))?
        }
        None => TemplateContext::new(),
    };

    let mut options = EvaluationOptions::from(&config.evaluation);
    if let Some(style) = placeholder {
        options.placeholder = style;
    }

    let evaluated = Evaluator::new(options).evaluate(&template, &context)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&evaluated)?);
        return Ok(());
    }

    println!("{}", evaluated.sql);
    if !evaluated.parameters.is_empty() {
        println!();
        println!("{}", "Parameters:".bold());
        for parameter in &evaluated.parameters {
            let sql_type = parameter
                .sql_type
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_else(|| "?".to_string());
            println!(
                "  {:>3}  {:<6} {:<20} {:<10} {}",
                parameter.ordinal + 1,
                parameter.direction,
                parameter.name,
                sql_type,
                parameter.value
            );
        }
    }
    for parameter in &evaluated.out_of_band {
        println!("  {}  {} {}", "stream".cyan(), parameter.name, parameter.value);
    }
    Ok(())
}

/// Collect template files from files and directories
fn collect_templates(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for path in paths {
        if path.is_file() {
            files.push(path.clone());
            continue;
        }

        for entry in WalkDir::new(path)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if entry.file_type().is_file() && entry.path().extension().is_some_and(|ext| ext == "sql") {
                files.push(entry.path().to_path_buf());
            }
        }
    }

    files
}

/// Diagnostics for one template text
fn check_template(cache: &TemplateCache, validator: &SqlValidator, name: &str, text: &str) -> Vec<Diagnostic> {
    let template = match cache.get_or_parse_named(Some(name), text) {
        Ok(template) => template,
        Err(error) => return vec![error.to_diagnostic()],
    };

    match validator.validate_template(&template) {
        Ok(_) => Vec::new(),
        Err(error) => vec![error.to_diagnostic()],
    }
}

/// Check command - validate templates
fn check_command(
    config: &Config,
    paths: &[PathBuf],
    output: &Path,
    markdown: Option<&Path>,
    verbose: bool,
) -> Result<()> {
    let files = collect_templates(paths);
    if files.is_empty() {
        return Err(anyhow::anyhow!("No .sql templates found"));
    }

    let cache = TemplateCache::new();
    let validator = SqlValidator::from_dialect(&config.dialect);
    let mut report = Report::new();

    for file in &files {
        let name = file.display().to_string();

        let diagnostics = match std::fs::read_to_string(file) {
            Ok(text) => check_template(&cache, &validator, &name, &text),
            Err(e) => vec![Diagnostic::new(
                twoway_core::DiagnosticCode::TemplateParseError,
                Severity::Error,
                format!("Failed to read template {}: {}", name, e),
            )
            .with_location(twoway_core::Location::new(name.clone()))],
        };

        if verbose {
            if diagnostics.is_empty() {
                eprintln!("  {} {}", "✓".green(), name);
            } else {
                eprintln!("  {} {} ({} issues)", "✗".red(), name, diagnostics.len());
            }
        }

        for mut diag in diagnostics {
            diag.severity = config.severity.get_severity(diag.code, diag.severity);
            report.add_diagnostic(diag);
        }
        report.mark_checked(name);
    }

    tracing::debug!(stats = ?cache.stats(), "template cache");

    report.save_to_file(output)?;
    if verbose {
        eprintln!("{} {}", "Report saved to:".green(), output.display());
    }

    if let Some(md_path) = markdown {
        std::fs::write(md_path, generate_markdown_report(&report))?;
        if verbose {
            eprintln!("{} {}", "Markdown report saved to:".green(), md_path.display());
        }
    }

    print_report_summary(&report);

    if report.has_errors() {
        std::process::exit(1);
    }

    Ok(())
}

fn print_report_summary(report: &Report) {
    println!("\n{}", "=".repeat(60).bright_blue());
    println!("{}", "Template Check Report".bold().bright_blue());
    println!("{}", "=".repeat(60).bright_blue());
    println!();

    println!("Version: {}", report.version);
    println!("Timestamp: {}", report.timestamp);
    println!();

    println!("{}", "Summary:".bold());
    println!("  Templates checked: {}", report.summary.templates_checked);
    println!("  Total diagnostics: {}", report.summary.total);

    if report.summary.errors > 0 {
        println!("  Errors:   {}", format!("{}", report.summary.errors).red().bold());
    } else {
        println!("  Errors:   {}", format!("{}", report.summary.errors).green());
    }

    if report.summary.warnings > 0 {
        println!("  Warnings: {}", format!("{}", report.summary.warnings).yellow());
    } else {
        println!("  Warnings: {}", format!("{}", report.summary.warnings).green());
    }

    println!("  Info:     {}", report.summary.info);
    println!();

    let failed = report.failed_templates();
    if !failed.is_empty() {
        println!("{}", "Failed templates:".bold());
        for template in failed {
            println!("  {}", template.red());
        }
        println!();
    }

    if report.diagnostics.is_empty() {
        println!("{}", "✓ No issues found!".green().bold());
    } else {
        println!("{}", "Diagnostics:".bold());
        for diag in &report.diagnostics {
            let severity_str = match diag.severity {
                Severity::Error => "ERROR".red().bold(),
                Severity::Warn => "WARN".yellow().bold(),
                Severity::Info => "INFO".cyan(),
            };

            println!("  [{}] {}: {}", severity_str, diag.code, diag.message);

            if let Some(loc) = &diag.location {
                println!("    at {}", loc);
            }
            if let Some(marker) = &diag.marker {
                println!("    Marker: {}", marker);
            }
            if !diag.node_path.is_empty() {
                println!("    Path:   {}", diag.node_path.join(" > "));
            }
        }
    }

    println!();
    println!("{}", "=".repeat(60).bright_blue());
}

/// Generate markdown report
fn generate_markdown_report(report: &Report) -> String {
    let mut md = String::new();

    md.push_str("# Template Check Report\n\n");
    md.push_str(&format!("**Version:** {}\n\n", report.version));
    md.push_str(&format!("**Timestamp:** {}\n\n", report.timestamp));

    md.push_str("## Summary\n\n");
    md.push_str(&format!("- Templates checked: {}\n", report.summary.templates_checked));
    md.push_str(&format!("- Total diagnostics: {}\n", report.summary.total));
    md.push_str(&format!("- Errors: {}\n", report.summary.errors));
    md.push_str(&format!("- Warnings: {}\n", report.summary.warnings));
    md.push_str(&format!("- Info: {}\n", report.summary.info));
    md.push('\n');

    let failed = report.failed_templates();
    if !failed.is_empty() {
        md.push_str("## Failed templates\n\n");
        for template in failed {
            md.push_str(&format!("- `{}`\n", template));
        }
        md.push('\n');
    }

    if report.diagnostics.is_empty() {
        md.push_str("✅ **No issues found!**\n");
    } else {
        md.push_str("## Diagnostics\n\n");

        for diag in &report.diagnostics {
            let severity_emoji = match diag.severity {
                Severity::Error => "❌",
                Severity::Warn => "⚠️",
                Severity::Info => "ℹ️",
            };

            md.push_str(&format!("### {} {} - {}\n\n", severity_emoji, diag.severity, diag.code));
            md.push_str(&format!("{}\n\n", diag.message));

            if let Some(loc) = &diag.location {
                md.push_str(&format!("**Location:** {}\n\n", loc));
            }
            if let Some(marker) = &diag.marker {
                md.push_str(&format!("**Marker:** `{}`\n\n", marker));
            }
            if !diag.node_path.is_empty() {
                md.push_str(&format!("**Node path:** {}\n\n", diag.node_path.join(" > ")));
            }
        }
    }

    md
}

#[cfg(test)]
mod tests {
    use super::*;
    use twoway_core::DiagnosticCode;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn placeholder_flag_parses() {
        let cli = Cli::try_parse_from(["twoway", "render", "q.sql", "--placeholder", "dollar"]).unwrap();
        match cli.command {
            Commands::Render { placeholder, .. } => assert_eq!(placeholder, Some(PlaceholderStyle::Dollar)),
            _ => panic!("expected render"),
        }
    }

    #[test]
    fn collects_sql_files_recursively() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("a.sql"), "select 1").unwrap();
        std::fs::write(dir.path().join("nested/b.sql"), "select 2").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "not sql").unwrap();

        let files = collect_templates(&[dir.path().to_path_buf()]);
        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|f| f.extension().is_some_and(|e| e == "sql")));
    }

    #[test]
    fn check_reports_structure_and_sql_errors() {
        let cache = TemplateCache::new();
        let validator = SqlValidator::new();

        assert!(check_template(&cache, &validator, "ok.sql", "select * from t where id = /*id*/1").is_empty());

        let unterminated = check_template(&cache, &validator, "open.sql", "select 1 /*%if a*/");
        assert_eq!(unterminated[0].code, DiagnosticCode::TemplateUnterminatedBlock);

        let broken = check_template(&cache, &validator, "broken.sql", "select (1 /*a*/2 from t");
        assert_eq!(broken[0].code, DiagnosticCode::SqlParseError);
    }

    #[test]
    fn markdown_lists_diagnostics() {
        let mut report = Report::new();
        report.add_diagnostic(
            Diagnostic::new(DiagnosticCode::TemplateParseError, Severity::Error, "duplicate else")
                .with_location(twoway_core::Location::with_line("broken.sql", 4))
                .with_marker("/*%else*/"),
        );
        report.mark_checked("broken.sql");

        let md = generate_markdown_report(&report);
        assert!(md.contains("- Templates checked: 1"));
        assert!(md.contains("**Marker:** `/*%else*/`"));
        assert!(md.contains("## Failed templates\n\n- `broken.sql`"));
    }
}
