use clap::{Parser, Subcommand};
use labelmatch::corpus::builder::source_images_in_dir;
use labelmatch::{
    BestMatch, BottleDetail, CatalogColumns, CatalogTable, ClaheConfig, CorpusBuilder,
    DescriptorExtractor, EngineConfig, ExtractorConfig, Identification, IdentificationService,
    IdentifyError, MatchConfig, MatchScheduler, NoMatchReason,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const EXAMPLE_JSON: &str =
    include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/config.example.json"));

#[derive(Parser, Debug)]
#[command(author, version, about = "labelmatch CLI (JSON config driven)")]
struct Cli {
    /// Path to the JSON configuration file.
    #[arg(short, long, value_name = "FILE", default_value = "config.json")]
    config: PathBuf,
    /// Print an example config and exit.
    #[arg(long)]
    print_example: bool,
    /// Enable tracing output.
    #[arg(long)]
    trace: bool,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Identify the bottle in one or more label photos.
    Identify {
        /// Query image files.
        #[arg(required = true)]
        images: Vec<PathBuf>,
    },
    /// Describe the catalog images in `images_dir` and write the corpus.
    BuildCorpus,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct MatchConfigJson {
    ratio_threshold: f32,
    min_match_count: usize,
}

impl Default for MatchConfigJson {
    fn default() -> Self {
        let cfg = MatchConfig::default();
        Self {
            ratio_threshold: cfg.ratio_threshold,
            min_match_count: cfg.min_match_count,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct ClaheConfigJson {
    clip_limit: f32,
    tiles: usize,
}

impl Default for ClaheConfigJson {
    fn default() -> Self {
        let cfg = ClaheConfig::default();
        Self {
            clip_limit: cfg.clip_limit,
            tiles: cfg.tiles,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct ExtractorConfigJson {
    max_features: usize,
    max_dimension: u32,
    pyramid_levels: usize,
    fast_threshold: u8,
    clahe: Option<ClaheConfigJson>,
}

impl Default for ExtractorConfigJson {
    fn default() -> Self {
        let cfg = ExtractorConfig::default();
        Self {
            max_features: cfg.max_features,
            max_dimension: cfg.max_dimension,
            pyramid_levels: cfg.pyramid_levels,
            fast_threshold: cfg.fast_threshold,
            clahe: Some(ClaheConfigJson::default()),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct ColumnsJson {
    id: String,
    name: String,
    image_source: String,
}

impl Default for ColumnsJson {
    fn default() -> Self {
        let cfg = CatalogColumns::default();
        Self {
            id: cfg.id,
            name: cfg.name,
            image_source: cfg.image_source,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct Config {
    corpus_path: String,
    catalog_path: String,
    images_dir: Option<String>,
    output_path: Option<String>,
    topk: usize,
    workers: Option<usize>,
    cache_capacity: usize,
    time_budget_ms: Option<u64>,
    matching: MatchConfigJson,
    extractor: ExtractorConfigJson,
    columns: ColumnsJson,
}

impl Default for Config {
    fn default() -> Self {
        let cfg = EngineConfig::default();
        Self {
            corpus_path: String::new(),
            catalog_path: String::new(),
            images_dir: None,
            output_path: None,
            topk: 1,
            workers: None,
            cache_capacity: cfg.cache_capacity,
            time_budget_ms: cfg.time_budget.map(|b| b.as_millis() as u64),
            matching: MatchConfigJson::default(),
            extractor: ExtractorConfigJson::default(),
            columns: ColumnsJson::default(),
        }
    }
}

impl Config {
    fn engine_config(&self) -> EngineConfig {
        let defaults = EngineConfig::default();
        EngineConfig {
            matching: MatchConfig {
                ratio_threshold: self.matching.ratio_threshold,
                min_match_count: self.matching.min_match_count,
            },
            extractor: ExtractorConfig {
                max_features: self.extractor.max_features,
                max_dimension: self.extractor.max_dimension,
                pyramid_levels: self.extractor.pyramid_levels,
                fast_threshold: self.extractor.fast_threshold,
                clahe: self.extractor.clahe.as_ref().map(|c| ClaheConfig {
                    clip_limit: c.clip_limit,
                    tiles: c.tiles,
                }),
            },
            workers: self.workers.unwrap_or(defaults.workers),
            cache_capacity: self.cache_capacity,
            time_budget: self.time_budget_ms.map(Duration::from_millis),
            columns: CatalogColumns {
                id: self.columns.id.clone(),
                name: self.columns.name.clone(),
                image_source: self.columns.image_source.clone(),
            },
        }
    }
}

#[derive(Debug, Serialize)]
struct MatchRecord {
    id: String,
    score: f32,
    good_match_count: usize,
}

impl From<&BestMatch> for MatchRecord {
    fn from(value: &BestMatch) -> Self {
        Self {
            id: value.id.to_string(),
            score: value.score,
            good_match_count: value.good_match_count,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
enum Status {
    Matched,
    DetailsUnavailable,
    NoMatch,
    NotReady,
    Timeout,
}

#[derive(Debug, Serialize)]
struct IdentifyRecord {
    image: String,
    status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    best: Option<MatchRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    topk: Vec<MatchRecord>,
}

impl IdentifyRecord {
    fn new(image: String, status: Status) -> Self {
        Self {
            image,
            status,
            best: None,
            details: None,
            reason: None,
            topk: Vec::new(),
        }
    }
}

#[derive(Debug, Serialize)]
struct BuildRecord {
    corpus_path: String,
    added: usize,
    duplicates: usize,
    unreadable: usize,
    empty: usize,
    missing_images: usize,
}

fn detail_map(detail: &BottleDetail) -> BTreeMap<String, String> {
    detail.attributes().clone()
}

fn no_match_reason(reason: &NoMatchReason) -> String {
    match reason {
        NoMatchReason::UnreadableImage { reason } => format!("unreadable image: {reason}"),
        NoMatchReason::InsufficientDescriptors { found, required } => {
            format!("insufficient descriptors: {found} < {required}")
        }
        NoMatchReason::BelowThreshold => "no reference reached the match threshold".to_owned(),
    }
}

fn identify_one(
    service: &IdentificationService,
    path: &Path,
    topk: usize,
) -> Result<IdentifyRecord, Box<dyn std::error::Error>> {
    let image = path.display().to_string();
    let Some(engine) = service.engine() else {
        let mut record = IdentifyRecord::new(image, Status::NotReady);
        record.reason = service.init_error().map(ToString::to_string);
        return Ok(record);
    };

    let ranked = match engine.identify_path_ranked(path, topk) {
        Ok(ranked) => ranked,
        Err(err @ IdentifyError::Timeout { .. }) => {
            let mut record = IdentifyRecord::new(image, Status::Timeout);
            record.reason = Some(err.to_string());
            return Ok(record);
        }
        Err(err) => return Err(err.into()),
    };

    let mut record = match &ranked.identification {
        Identification::Matched { best, details } => {
            let mut record = IdentifyRecord::new(image, Status::Matched);
            record.best = Some(best.into());
            record.details = Some(detail_map(details));
            record
        }
        Identification::DetailsUnavailable { best } => {
            let mut record = IdentifyRecord::new(image, Status::DetailsUnavailable);
            record.best = Some(best.into());
            record
        }
        Identification::NoMatch(reason) => {
            let mut record = IdentifyRecord::new(image, Status::NoMatch);
            record.reason = Some(no_match_reason(reason));
            record
        }
    };
    if topk > 1 {
        record.topk = ranked.ranking.iter().map(MatchRecord::from).collect();
    }
    Ok(record)
}

fn build_corpus(config: &Config) -> Result<BuildRecord, Box<dyn std::error::Error>> {
    let Some(images_dir) = config.images_dir.as_deref() else {
        return Err("build-corpus needs images_dir in the config".into());
    };
    let cfg = config.engine_config();
    cfg.validate()?;
    let table = CatalogTable::load(&config.catalog_path, &cfg.columns)?;
    let listing = source_images_in_dir(&table, images_dir);
    tracing::info!(
        images = listing.images.len(),
        missing = listing.missing.len(),
        "resolved catalog images"
    );

    let builder = CorpusBuilder::new(
        DescriptorExtractor::new(cfg.extractor.clone())?,
        MatchScheduler::new(cfg.workers)?,
    );
    let (corpus, report) = builder.build(&listing.images)?;
    corpus.save(&config.corpus_path)?;

    Ok(BuildRecord {
        corpus_path: config.corpus_path.clone(),
        added: report.added,
        duplicates: report.duplicates,
        unreadable: report.unreadable,
        empty: report.empty,
        missing_images: listing.missing.len(),
    })
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.trace {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::from_default_env().add_directive("labelmatch=info".parse()?),
            )
            .with_target(false)
            .init();
    }

    if cli.print_example {
        println!("{EXAMPLE_JSON}");
        return Ok(());
    }
    let Some(command) = cli.command else {
        return Err("a subcommand is required (identify or build-corpus)".into());
    };

    let config_text = fs::read_to_string(&cli.config)?;
    let config: Config = serde_json::from_str(&config_text)?;
    if config.corpus_path.is_empty() || config.catalog_path.is_empty() {
        return Err("corpus_path and catalog_path are required".into());
    }
    if config.topk == 0 {
        return Err("topk must be at least 1".into());
    }

    let json = match command {
        Command::Identify { images } => {
            let service = IdentificationService::start(
                &config.corpus_path,
                &config.catalog_path,
                config.engine_config(),
            );
            let records = images
                .iter()
                .map(|path| identify_one(&service, path, config.topk))
                .collect::<Result<Vec<_>, _>>()?;
            serde_json::to_string_pretty(&records)?
        }
        Command::BuildCorpus => serde_json::to_string_pretty(&build_corpus(&config)?)?,
    };

    match config.output_path {
        Some(path) => fs::write(path, json)?,
        None => println!("{json}"),
    }

    Ok(())
}
