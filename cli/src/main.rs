mod curate;
mod lookup;
mod runs;
mod workspace;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use larder_core::{AllergenKind, Confidence};

use crate::workspace::Workspace;

#[derive(Parser)]
#[command(name = "larder")]
#[command(
    about = "Ingredient normalization, allergen and product matching tools",
    long_about = None
)]
struct Cli {
    /// Catalog snapshot (JSON). Created on first write if missing.
    #[arg(long, global = true, env = "LARDER_CATALOG", default_value = "catalog.json")]
    catalog: PathBuf,

    /// Alternate rule file; the embedded rules are used when absent
    #[arg(long, global = true, env = "LARDER_RULES")]
    rules: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Flags shared by the batch commands.
#[derive(Args, Debug, Clone)]
struct BatchArgs {
    /// Lowest confidence tier that is written
    #[arg(long, default_value = "suggested")]
    threshold: Confidence,
    /// Items per chunk
    #[arg(long, default_value_t = 500)]
    chunk_size: usize,
    /// Chunks processed concurrently
    #[arg(long, default_value_t = 4)]
    workers: usize,
    /// Restart at this chunk (the report's last_committed_chunk + 1)
    #[arg(long, default_value_t = 0)]
    resume_from: usize,
    /// First input row / catalog position to process
    #[arg(long, default_value_t = 0)]
    offset: usize,
    /// Maximum number of rows to process
    #[arg(long)]
    limit: Option<usize>,
    /// Also write the run report to this file
    #[arg(long)]
    report: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the normalized form of an ingredient line
    Normalize {
        text: String,
    },
    /// Resolve an ingredient line and show allergens, substitutes and products
    Resolve {
        text: String,
        /// Allergen the user avoids (repeatable)
        #[arg(long = "allergen")]
        allergens: Vec<AllergenKind>,
        /// Lowest product tag tier to show
        #[arg(long, default_value = "suggested")]
        confidence: Confidence,
    },
    /// List catalog products for a canonical ingredient
    Match {
        canonical: String,
        #[arg(long, default_value = "suggested")]
        confidence: Confidence,
        /// Drop products carrying this allergen (repeatable)
        #[arg(long = "avoid")]
        avoid: Vec<AllergenKind>,
    },
    /// Map raw mentions (one per line) to canonical ingredients
    MapMentions {
        /// Input file with one ingredient mention per line
        #[arg(long)]
        input: PathBuf,
        /// Create canonicals for frequent unresolved names
        #[arg(long)]
        create_novel: bool,
        /// Occurrences needed before a novel canonical is created
        #[arg(long, default_value_t = 3)]
        min_frequency: usize,
        #[command(flatten)]
        batch: BatchArgs,
    },
    /// Tag untagged catalog products with canonical ingredients
    TagProducts {
        #[command(flatten)]
        batch: BatchArgs,
    },
    /// Check every substitution row for allergen-safety defects
    AuditSubstitutions {
        /// Delete rows that can never be served
        #[arg(long)]
        quarantine: bool,
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Create a canonical ingredient
    AddCanonical {
        name: String,
        #[arg(long = "alias")]
        aliases: Vec<String>,
        #[arg(long = "allergen")]
        allergens: Vec<AllergenKind>,
    },
    /// Attach an alias to an existing canonical
    AddAlias {
        canonical: String,
        alias: String,
    },
    /// Configure a substitute for a canonical ingredient
    AddSubstitution {
        canonical: String,
        substitute: String,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Declare that canonicals named TERM carry ALLERGEN
    AddDerivative {
        allergen: AllergenKind,
        term: String,
    },
    /// Tag a catalog product by hand
    TagProduct {
        product_id: String,
        canonical: String,
        #[arg(long, default_value = "confident")]
        confidence: Confidence,
        /// Overwrite even a higher-tier tag
        #[arg(long)]
        force: bool,
    },
}

fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    // Logs go to stderr so JSON output on stdout stays pipeable.
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    init_tracing();
    let Cli {
        catalog,
        rules,
        command,
    } = Cli::parse();
    let open = || Workspace::open(&catalog, rules.as_deref());

    match command {
        Commands::Normalize { text } => {
            lookup::normalize(&Workspace::rules_only(rules.as_deref())?, &text)?
        }
        Commands::Resolve {
            text,
            allergens,
            confidence,
        } => lookup::resolve(&open()?, &text, &allergens, confidence)?,
        Commands::Match {
            canonical,
            confidence,
            avoid,
        } => lookup::match_products(&open()?, &canonical, confidence, &avoid)?,
        Commands::MapMentions {
            input,
            create_novel,
            min_frequency,
            batch,
        } => runs::map_mentions(&open()?, &input, create_novel, min_frequency, &batch)?,
        Commands::TagProducts { batch } => runs::tag_products(&open()?, &batch)?,
        Commands::AuditSubstitutions { quarantine, report } => {
            runs::audit(&open()?, quarantine, report.as_deref())?
        }
        Commands::AddCanonical {
            name,
            aliases,
            allergens,
        } => curate::add_canonical(&open()?, &name, &aliases, &allergens)?,
        Commands::AddAlias { canonical, alias } => curate::add_alias(&open()?, &canonical, &alias)?,
        Commands::AddSubstitution {
            canonical,
            substitute,
            notes,
        } => curate::add_substitution(&open()?, &canonical, &substitute, notes)?,
        Commands::AddDerivative { allergen, term } => {
            curate::add_derivative(&open()?, allergen, &term)?
        }
        Commands::TagProduct {
            product_id,
            canonical,
            confidence,
            force,
        } => curate::tag_product(&open()?, &product_id, &canonical, confidence, force)?,
    }

    Ok(())
}
