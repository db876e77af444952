use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};

mod output;
use output::ColorMode;

use reviewer_core::{
    Affiliation, Author, Config, Filters, InMemoryRepository, ManuscriptMetadata, RepositoryPort, ReviewerCore,
    SearchState, SearchTerms, Sort, SortDirection, SortField, ValidationConfig, new_process,
};

/// Federated reviewer search, aggregation, validation and recommendation engine.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Search external databases for reviewer candidates, validate them
    /// against the manuscript, and print a ranked recommendation page.
    Recommend {
        /// Manuscript title
        #[arg(long, default_value = "Untitled manuscript")]
        title: String,

        /// Comma-separated manuscript keywords
        #[arg(long, value_delimiter = ',')]
        keywords: Vec<String>,

        /// Comma-separated manuscript author names, excluded as reviewers
        #[arg(long, value_delimiter = ',')]
        authors: Vec<String>,

        /// Comma-separated manuscript institution names
        #[arg(long, value_delimiter = ',')]
        affiliations: Vec<String>,

        /// Comma-separated list of databases to query
        #[arg(long, value_delimiter = ',', default_value = "PUBMED,WILEY,TAYLOR_FRANCIS")]
        databases: Vec<String>,

        /// PubMed API key (unlocks a higher rate limit)
        #[arg(long)]
        pubmed_api_key: Option<String>,

        /// Elsevier API key (required for the ELSEVIER adapter)
        #[arg(long)]
        elsevier_api_key: Option<String>,

        /// Contact email sent as `mailto` to Crossref and PubMed
        #[arg(long)]
        mailto: Option<String>,

        /// Per-candidate minimum publication count
        #[arg(long, default_value_t = 5)]
        min_publications: u32,

        /// Per-candidate maximum retraction count
        #[arg(long, default_value_t = 0)]
        max_retractions: u32,

        /// Result page number (1-based)
        #[arg(long, default_value_t = 1)]
        page: u32,

        /// Results per page (capped at 100)
        #[arg(long, default_value_t = 20)]
        limit: u32,

        /// Disable colored output
        #[arg(long)]
        no_color: bool,
    },

    /// Synchronously search by name across enabled databases (manual
    /// reviewer addition), printing the deduplicated candidates found.
    SearchByName {
        /// Name to search for
        name: String,

        /// Comma-separated list of databases to query
        #[arg(long, value_delimiter = ',', default_value = "PUBMED,WILEY,TAYLOR_FRANCIS")]
        databases: Vec<String>,

        #[arg(long)]
        pubmed_api_key: Option<String>,

        #[arg(long)]
        elsevier_api_key: Option<String>,

        #[arg(long)]
        mailto: Option<String>,

        #[arg(long)]
        no_color: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Recommend {
            title,
            keywords,
            authors,
            affiliations,
            databases,
            pubmed_api_key,
            elsevier_api_key,
            mailto,
            min_publications,
            max_retractions,
            page,
            limit,
            no_color,
        } => {
            recommend(
                title,
                keywords,
                authors,
                affiliations,
                databases,
                resolve_env(pubmed_api_key, "PUBMED_API_KEY"),
                resolve_env(elsevier_api_key, "ELSEVIER_API_KEY"),
                resolve_env(mailto, "REVIEWER_MAILTO"),
                min_publications,
                max_retractions,
                page,
                limit,
                ColorMode(!no_color),
            )
            .await
        }
        Command::SearchByName {
            name,
            databases,
            pubmed_api_key,
            elsevier_api_key,
            mailto,
            no_color,
        } => {
            search_by_name(
                name,
                databases,
                resolve_env(pubmed_api_key, "PUBMED_API_KEY"),
                resolve_env(elsevier_api_key, "ELSEVIER_API_KEY"),
                resolve_env(mailto, "REVIEWER_MAILTO"),
                ColorMode(!no_color),
            )
            .await
        }
    }
}

fn resolve_env(flag: Option<String>, var: &str) -> Option<String> {
    flag.or_else(|| std::env::var(var).ok())
}

fn build_config(databases: Vec<String>, pubmed_api_key: Option<String>, elsevier_api_key: Option<String>, mailto: Option<String>) -> Config {
    let mut config = Config::default();
    config.enabled_databases = databases.into_iter().map(|d| d.trim().to_uppercase()).collect();
    config.pubmed_api_key = pubmed_api_key;
    config.elsevier_api_key = elsevier_api_key;
    config.mailto = mailto;
    config
}

#[allow(clippy::too_many_arguments)]
async fn recommend(
    title: String,
    keywords: Vec<String>,
    authors: Vec<String>,
    affiliations: Vec<String>,
    databases: Vec<String>,
    pubmed_api_key: Option<String>,
    elsevier_api_key: Option<String>,
    mailto: Option<String>,
    min_publications: u32,
    max_retractions: u32,
    page: u32,
    limit: u32,
    color: ColorMode,
) -> anyhow::Result<()> {
    let manuscript = ManuscriptMetadata {
        title: title.clone(),
        authors: authors
            .iter()
            .enumerate()
            .map(|(i, name)| Author::new(format!("manuscript-author-{i}"), name.trim().to_string()))
            .collect(),
        affiliations: affiliations
            .iter()
            .enumerate()
            .map(|(i, name)| Affiliation {
                id: format!("manuscript-affiliation-{i}"),
                institution_name: name.trim().to_string(),
                department: None,
                address: None,
                country: None,
            })
            .collect(),
        abstract_text: String::new(),
        keywords: keywords.iter().map(|k| k.trim().to_string()).collect(),
        primary_focus_area: None,
        secondary_focus_area: None,
    };

    let repo: Arc<dyn RepositoryPort> = Arc::new(InMemoryRepository::new());
    let process_id = "cli-process";
    repo.create_process(new_process(process_id, "cli-user", title.clone()))?;
    repo.update_metadata(process_id, manuscript.clone())?;

    let config = build_config(databases, pubmed_api_key, elsevier_api_key, mailto);
    let validation_config = ValidationConfig {
        min_publications,
        max_retractions,
        ..ValidationConfig::default()
    };

    let core = ReviewerCore::new(config, repo.clone());

    let terms = SearchTerms {
        keywords: manuscript.keywords.iter().cloned().collect(),
        ..SearchTerms::default()
    };

    println!("Searching for reviewer candidates for \"{title}\"...");
    core.start_search(process_id, terms, None).await;

    let status = loop {
        tokio::time::sleep(Duration::from_millis(100)).await;
        let Some(status) = core.get_search_status(process_id).await else {
            continue;
        };
        if status.state == SearchState::Completed {
            break status;
        }
    };

    let mut stdout = std::io::stdout();
    output::print_search_status(&mut stdout, &status, color)?;

    let result = core.validate_process_authors(process_id, &manuscript, &validation_config)?;
    println!(
        "Validated {}/{} candidates against the manuscript.",
        result.validated_candidates, result.total_candidates
    );

    let sort = Sort {
        field: SortField::PublicationCount,
        direction: SortDirection::Desc,
    };
    let response = core.get_recommendations(process_id, Filters::default(), Some(sort), page, limit)?;
    output::print_recommendations(&mut stdout, &response, color)?;

    Ok(())
}

async fn search_by_name(
    name: String,
    databases: Vec<String>,
    pubmed_api_key: Option<String>,
    elsevier_api_key: Option<String>,
    mailto: Option<String>,
    color: ColorMode,
) -> anyhow::Result<()> {
    let repo: Arc<dyn RepositoryPort> = Arc::new(InMemoryRepository::new());
    let config = build_config(databases, pubmed_api_key, elsevier_api_key, mailto);
    let enabled = config.enabled_databases.clone();
    let core = ReviewerCore::new(config, repo);

    println!("Searching for \"{name}\" across {} database(s)...", enabled.len());
    let candidates = core.search_by_name(&name, None).await;

    if color.enabled() {
        use owo_colors::OwoColorize;
        println!("{}", format!("Found {} candidate(s):", candidates.len()).bold());
    } else {
        println!("Found {} candidate(s):", candidates.len());
    }
    for candidate in candidates {
        println!(
            "  {} (publications: {})",
            candidate.author.name, candidate.author.publication_count
        );
    }
    Ok(())
}
