use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use judgeboard::api::models::{
    Annotation, AnnotationCreate, Category, Conversation, EvaluationRequest, Evaluation, Health,
    Job, JobCreate, JobProgress, JobStatus, MetaEvaluation, Page, Rubric, StatsOverview,
};
use judgeboard::api::{ClientConfig, API_PREFIX};
use judgeboard::sync::config::{DEFAULT_POLL_INTERVAL_MS, DEFAULT_REQUEST_TIMEOUT_SECS, DEFAULT_TIMESERIES_DAYS};
use judgeboard::sync::{queries, Extract, FetchStatus, ListParams, Query, QueryCache, SyncConfig};
use judgeboard::CacheManager;
use serde::Serialize;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Base URL of the judge API
    #[arg(long, env = "JUDGEBOARD_API_URL", default_value = judgeboard::api::DEFAULT_API_URL)]
    api_url: String,

    /// Per-request timeout in seconds
    #[arg(long, env = "JUDGEBOARD_TIMEOUT_SECS", default_value_t = DEFAULT_REQUEST_TIMEOUT_SECS)]
    timeout_secs: u64,

    /// Interval between job progress fetches in milliseconds
    #[arg(long, default_value_t = DEFAULT_POLL_INTERVAL_MS)]
    poll_interval_ms: u64,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Args, Debug)]
struct PageArgs {
    #[arg(long, default_value_t = 1)]
    page: u32,

    #[arg(long, default_value_t = judgeboard::sync::config::DEFAULT_PAGE_SIZE)]
    page_size: u32,

    /// Conversation category, e.g. retoure
    #[arg(long)]
    category: Option<Category>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List conversations
    Conversations {
        #[command(flatten)]
        page: PageArgs,

        /// Free-text search
        #[arg(long)]
        search: Option<String>,
    },
    /// Show one conversation
    Conversation { id: String },
    /// Delete a conversation
    DeleteConversation { id: String },
    /// List evaluations
    Evaluations {
        #[command(flatten)]
        page: PageArgs,

        #[arg(long)]
        min_score: Option<f64>,

        #[arg(long)]
        max_score: Option<f64>,

        /// Only evaluations flagged with a critical error
        #[arg(long)]
        critical_error: bool,
    },
    /// Show one evaluation
    Evaluation { id: String },
    /// Evaluate a stored conversation
    Evaluate {
        conversation_id: String,

        #[arg(long)]
        rubric_id: Option<String>,
    },
    /// Delete an evaluation
    DeleteEvaluation { id: String },
    /// List batch jobs
    Jobs {
        #[arg(long)]
        status: Option<JobStatus>,

        #[arg(long, default_value_t = 1)]
        page: u32,
    },
    /// Show one batch job
    Job { id: String },
    /// Start a batch evaluation job
    CreateJob {
        #[arg(long)]
        name: Option<String>,

        /// Evaluate only these conversations (repeatable)
        #[arg(long = "conversation-id")]
        conversation_ids: Vec<String>,

        #[arg(long)]
        category: Option<Category>,

        #[arg(long)]
        batch_size: Option<u32>,

        /// Follow progress until the job finishes
        #[arg(short, long)]
        watch: bool,
    },
    /// Cancel a running batch job
    CancelJob { id: String },
    /// Follow a job's progress until it finishes
    Watch { job_id: String },
    /// Overview statistics and the daily score series
    Stats {
        #[arg(long, default_value_t = DEFAULT_TIMESERIES_DAYS)]
        days: u32,
    },
    /// List rubrics
    Rubrics,
    /// Show one rubric
    Rubric { id: String },
    /// List human annotations
    Annotations {
        #[arg(long)]
        evaluation_id: Option<String>,

        #[arg(long)]
        annotator: Option<String>,

        #[arg(long, default_value_t = 1)]
        page: u32,
    },
    /// Record a human score for an evaluation
    Annotate {
        evaluation_id: String,

        #[arg(long)]
        annotator: String,

        /// Overall score from 0 to 10
        #[arg(long)]
        score: f64,

        /// Whether the annotator agrees with the judge
        #[arg(long)]
        agrees: Option<bool>,

        #[arg(long)]
        reason: Option<String>,

        #[arg(long)]
        notes: Option<String>,
    },
    /// Judge versus human agreement
    MetaEvaluation,
    /// API and dependency health
    Health,
}

impl PageArgs {
    fn to_list_params(&self) -> ListParams {
        let params = ListParams::default().page(self.page, self.page_size);
        match self.category {
            Some(category) => params.category(category),
            None => params,
        }
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn show<T: Extract + Serialize>(cache: &QueryCache, query: &Query) -> anyhow::Result<()> {
    if !query.enabled {
        bail!("an identifier is required for {}", query.key.resource);
    }
    let entry = cache.load(query).await?;
    let record = entry
        .get::<T>()
        .with_context(|| format!("no {} record in response", query.key.resource))?;
    print_json(record)
}

async fn watch_job(manager: &CacheManager, job_id: &str) -> anyhow::Result<()> {
    if job_id.trim().is_empty() {
        bail!("job id must not be empty");
    }
    let mut updates = manager.watch_job(job_id).into_stream();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                eprintln!("interrupted");
                break;
            }
            update = updates.next() => {
                let Some(entry) = update else { break };
                match (entry.status, entry.get::<JobProgress>()) {
                    (FetchStatus::Success, Some(progress)) => {
                        let status = progress.status.map_or("-", JobStatus::as_str);
                        println!(
                            "{:>7.2}%  {:<9}  completed {}  failed {}",
                            progress.progress_percent, status, progress.completed_count, progress.failed_count
                        );
                        if progress.is_terminal() {
                            break;
                        }
                    }
                    (FetchStatus::Error, _) => {
                        if let Some(error) = &entry.error {
                            eprintln!("progress fetch failed: {error} (retrying)");
                        }
                    }
                    _ => {}
                }
            }
        }
    }
    Ok(())
}

async fn run(args: Args, manager: &CacheManager) -> anyhow::Result<()> {
    let cache = manager.cache();
    let mutations = manager.mutations();

    match args.command {
        Command::Conversations { page, search } => {
            let mut params = page.to_list_params();
            if let Some(search) = search {
                params = params.search(search);
            }
            show::<Page<Conversation>>(cache, &queries::conversations(&params)).await
        }
        Command::Conversation { id } => show::<Conversation>(cache, &queries::conversation(&id)).await,
        Command::DeleteConversation { id } => {
            mutations.delete_conversation(&id).await?;
            println!("deleted conversation {id}");
            Ok(())
        }
        Command::Evaluations { page, min_score, max_score, critical_error } => {
            let params = ListParams {
                min_score,
                max_score,
                critical_error: critical_error.then_some(true),
                ..page.to_list_params()
            };
            show::<Page<Evaluation>>(cache, &queries::evaluations(&params)).await
        }
        Command::Evaluation { id } => show::<Evaluation>(cache, &queries::evaluation(&id)).await,
        Command::Evaluate { conversation_id, rubric_id } => {
            let evaluation = mutations
                .run_evaluation(EvaluationRequest { conversation_id, rubric_id })
                .await?;
            print_json(&evaluation)
        }
        Command::DeleteEvaluation { id } => {
            mutations.delete_evaluation(&id).await?;
            println!("deleted evaluation {id}");
            Ok(())
        }
        Command::Jobs { status, page } => {
            let mut params = ListParams::default().page(page, judgeboard::sync::config::DEFAULT_PAGE_SIZE);
            if let Some(status) = status {
                params = params.status(status);
            }
            show::<Page<Job>>(cache, &queries::jobs(&params)).await
        }
        Command::Job { id } => show::<Job>(cache, &queries::job(&id)).await,
        Command::CreateJob { name, conversation_ids, category, batch_size, watch } => {
            let input = JobCreate {
                name,
                conversation_ids: (!conversation_ids.is_empty()).then_some(conversation_ids),
                category_filter: category,
                batch_size,
                ..JobCreate::default()
            };
            let job = mutations.create_job(input).await?;
            print_json(&job)?;
            if watch {
                watch_job(manager, &job.id.to_string()).await?;
            }
            Ok(())
        }
        Command::CancelJob { id } => {
            let job = mutations.cancel_job(&id).await?;
            print_json(&job)
        }
        Command::Watch { job_id } => watch_job(manager, &job_id).await,
        Command::Stats { days } => {
            let overview_query = queries::stats_overview();
            let series_query = queries::stats_timeseries(days);
            let (overview, series) =
                futures::join!(cache.load(&overview_query), cache.load(&series_query));

            if let Some(overview) = overview?.get::<StatsOverview>() {
                print_json(overview)?;
            }
            if let Some(days) = series?.get::<Vec<judgeboard::api::models::DailyScore>>() {
                print_json(days)?;
            }
            Ok(())
        }
        Command::Rubrics => show::<Vec<Rubric>>(cache, &queries::rubrics()).await,
        Command::Rubric { id } => show::<Rubric>(cache, &queries::rubric(&id)).await,
        Command::Annotations { evaluation_id, annotator, page } => {
            let params = ListParams::default().page(page, judgeboard::sync::config::DEFAULT_PAGE_SIZE);
            let query = queries::annotations(&params, evaluation_id.as_deref(), annotator.as_deref());
            show::<Page<Annotation>>(cache, &query).await
        }
        Command::Annotate { evaluation_id, annotator, score, agrees, reason, notes } => {
            let annotation = mutations
                .create_annotation(AnnotationCreate {
                    evaluation_id,
                    annotator_id: annotator,
                    overall_score: score,
                    agreement_with_judge: agrees,
                    disagreement_reason: reason,
                    notes,
                    ..AnnotationCreate::default()
                })
                .await?;
            print_json(&annotation)
        }
        Command::MetaEvaluation => show::<MetaEvaluation>(cache, &queries::meta_evaluation()).await,
        Command::Health => {
            let entry = cache.load(&queries::health()).await?;
            let health = entry.get::<Health>().context("no health record in response")?;
            print_json(health)?;
            if !health.is_healthy() {
                bail!("API reports status {}", health.status);
            }
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let request_timeout = Duration::from_secs(args.timeout_secs);
    let client = ClientConfig {
        api_url: args.api_url.clone(),
        api_prefix: API_PREFIX.to_string(),
        request_timeout,
        user_agent: None,
    };
    let sync = SyncConfig {
        request_timeout,
        poll_interval: Duration::from_millis(args.poll_interval_ms),
        ..SyncConfig::default()
    };

    let mut manager = CacheManager::connect(&client, sync).context("failed to set up API client")?;
    let result = run(args, &manager).await;
    manager.shutdown().await;
    result
}
