use clap::Args;
use colored::{ColoredString, Colorize};
use mdr_common::config::Config;
use mdr_common::dependency::{Message, Severity};
use mdr_common::error::{MdrError, Result};
use mdr_common::model::{Coordinates, ModuleKey, Repository, ResolutionPlatform, ResolutionScope};
use mdr_core::{MavenResolver, ResolutionOutcome, ResolutionPolicy, ResolutionRequest};
use tracing::{debug, warn};

#[derive(Args, Debug)]
pub struct Resolve {
    /// Coordinates to resolve, `group:module[:version]`; a trailing `!!` forces the version
    #[arg(required = true)]
    pub coordinates: Vec<String>,

    /// BOM whose managed versions apply to the resolution
    #[arg(long = "bom")]
    pub boms: Vec<String>,

    /// Repository URL, local path or `mavenLocal`, in lookup order; replaces the configured list
    #[arg(long = "repo")]
    pub repositories: Vec<String>,

    #[arg(long, default_value = "compile")]
    pub scope: ResolutionScope,

    /// Target platform; more than one resolves Kotlin common metadata
    #[arg(long = "platform", default_value = "jvm")]
    pub platforms: Vec<ResolutionPlatform>,

    /// Download `-sources` jars as well
    #[arg(long)]
    pub sources: bool,

    /// Print the dependency tree
    #[arg(long)]
    pub tree: bool,

    /// Print the graph as JSON instead of file paths
    #[arg(long, conflicts_with = "tree")]
    pub json: bool,

    /// Print the paths through which `group:module` entered the graph at its resolved version
    #[arg(long, value_name = "MODULE", conflicts_with_all = ["tree", "json"])]
    pub why: Option<String>,

    /// With `--why`, keep paths requesting any version of the module
    #[arg(long, requires = "why")]
    pub all_paths: bool,

    /// Report errors but still print whatever could be resolved
    #[arg(long)]
    pub lenient: bool,
}

impl Resolve {
    pub async fn run(&self, config: &Config) -> Result<()> {
        let why = self.why.as_deref().map(|raw| Coordinates::parse(raw).map(|c| c.key())).transpose()?;
        let mut config = config.clone();
        if !self.repositories.is_empty() {
            config.repositories = self
                .repositories
                .iter()
                .map(|r| parse_repository(r))
                .collect::<Result<Vec<_>>>()?;
        }
        if self.sources {
            config.download_sources = true;
        }
        debug!("Repositories: {:?}", config.repositories);

        let request = ResolutionRequest::new(parse_all(&self.coordinates)?)
            .with_boms(parse_all(&self.boms)?)
            .with_scope(self.scope)
            .with_platforms(self.platforms.clone())
            .with_policy(if self.lenient {
                ResolutionPolicy::Lenient
            } else {
                ResolutionPolicy::Strict
            });

        let resolver = MavenResolver::new(config)?;
        let cancel = resolver.cancellation_token();
        let outcome = tokio::select! {
            outcome = resolver.resolve_request(&request) => outcome?,
            _ = tokio::signal::ctrl_c() => {
                warn!("Interrupted, cancelling resolution");
                cancel.cancel();
                return Err(MdrError::Cancelled);
            }
        };
        self.print(&outcome, why.as_ref())
    }

    fn print(&self, outcome: &ResolutionOutcome, why: Option<&ModuleKey>) -> Result<()> {
        if let Some(key) = why {
            if outcome.graph.find_maven(key).is_none() {
                warn!("{} is not part of the resolved graph", key);
            }
            print!("{}", outcome.graph.filter_paths(key, !self.all_paths).pretty_print());
        } else if self.json {
            println!("{}", serde_json::to_string_pretty(&outcome.graph.to_json())?);
        } else if self.tree {
            print!("{}", outcome.graph.pretty_print());
        } else {
            for file in &outcome.files {
                println!("{}", file.path.display());
            }
        }
        for message in &outcome.diagnostics {
            eprintln!("{}", render(message));
        }
        Ok(())
    }
}

fn parse_repository(raw: &str) -> Result<Repository> {
    if raw == "mavenLocal" {
        return Repository::maven_local()
            .ok_or_else(|| MdrError::Config("Could not determine the home directory".to_string()));
    }
    Repository::parse(raw)
}

fn parse_all(raw: &[String]) -> Result<Vec<Coordinates>> {
    raw.iter().map(|c| Coordinates::parse(c)).collect()
}

fn render(message: &Message) -> String {
    let label: ColoredString = match message.severity {
        Severity::Info => "info".blue(),
        Severity::Warning => "warning".yellow().bold(),
        Severity::Error => "error".red().bold(),
    };
    match &message.source {
        Some(source) => format!("{label}: {} {}", message.text, format!("({source})").dimmed()),
        None => format!("{label}: {}", message.text),
    }
}
