use accessmap_cli::analysis::AnalysisPayload;
use accessmap_cli::chat::{ChatClient, ChatContext, ChatSession};
use accessmap_cli::store::{NoticeLevel, Store};
use accessmap_cli::survey::{Coordinates, ResponsePlan, SurveyClient, SurveyIssue, SurveyLocation, SurveySubmission};
use accessmap_cli::views::{self, GapQuery, GapSort, RecommendationQuery, RecommendationSort, SourceFilter};
use accessmap_cli::{utils, AnalysisResults, ClientConfig, DEFAULT_REGION};
use clap::{Args as ClapArgs, Parser, Subcommand};
use serde_json::Map;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(author, version, about = "AccessMap accessibility-gap client", long_about = None)]
struct Args {
    /// Analysis service base URL (overrides ACCESSMAP_API_URL)
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Log debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check that the analysis service answers
    Health,

    /// Submit an analysis job and wait for its results
    Analyze {
        /// complete, scan, priority or plan
        #[arg(short, long, default_value = "complete")]
        kind: String,

        #[arg(short, long, default_value = DEFAULT_REGION)]
        region: String,

        /// Skip the summary section of a complete analysis
        #[arg(long)]
        no_summary: bool,

        #[command(flatten)]
        gaps: GapArgs,
    },

    /// Show the latest stored results for a region
    Latest {
        #[arg(short, long, default_value = DEFAULT_REGION)]
        region: String,

        #[command(flatten)]
        gaps: GapArgs,
    },

    /// List recommendations from the latest results
    Recommendations {
        #[arg(short, long, default_value = DEFAULT_REGION)]
        region: String,

        /// Priority to keep, e.g. high or immediate
        #[arg(long)]
        priority: Option<String>,

        /// Recommendation type to keep, e.g. infrastructure
        #[arg(long = "type")]
        kind: Option<String>,

        /// priority, cost, timeline, impact or type
        #[arg(long, default_value = "priority")]
        sort: String,
    },

    /// Ask the accessibility assistant a question
    Chat {
        #[arg(short, long, default_value = DEFAULT_REGION)]
        region: String,

        message: Vec<String>,
    },

    /// List community survey reports
    Surveys,

    /// Submit a community survey report
    Survey {
        #[arg(long)]
        city: String,
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        lng: f64,
        #[arg(long)]
        issue_type: String,
        #[arg(long, default_value = "moderate")]
        severity: String,
        #[arg(long, default_value = "")]
        description: String,
    },
}

#[derive(ClapArgs, Debug)]
struct GapArgs {
    /// critical, high, moderate or low
    #[arg(long)]
    severity: Option<String>,

    /// Keep gaps of one issue type
    #[arg(long)]
    issue_type: Option<String>,

    /// all, survey or ai
    #[arg(long, default_value = "all")]
    source: String,

    /// Case-insensitive text to look for
    #[arg(long, default_value = "")]
    search: String,

    /// severity, location, type or confidence
    #[arg(long, default_value = "severity")]
    sort: String,

    /// Maximum rows to print
    #[arg(long, default_value_t = 25)]
    limit: usize,
}

impl GapArgs {
    fn query(&self) -> Result<GapQuery, Box<dyn std::error::Error>> {
        Ok(GapQuery {
            severity: self.severity.clone(),
            issue_type: self.issue_type.clone(),
            source: self.source.parse::<SourceFilter>()?,
            search: self.search.clone(),
            sort_by: self.sort.parse::<GapSort>()?,
        })
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(if args.verbose { Level::DEBUG } else { Level::INFO })
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut config = ClientConfig::from_env()?;
    if let Some(url) = &args.api_url {
        config = config.with_analysis_url(url)?;
    }

    match args.command {
        Command::Health => {
            let store = Store::new(&config);
            let status = store.check_backend_connection().await;
            if store.is_connected() {
                println!("✅ {} is reachable", config.analysis_base_url);
            } else {
                eprintln!("❌ {} is {:?}", config.analysis_base_url, status);
            }
        }
        Command::Analyze {
            kind,
            region,
            no_summary,
            gaps,
        } => {
            let query = gaps.query()?;
            let store = Store::new(&config);
            let results = run_analysis(&store, &kind, &region, no_summary).await?;
            print_gaps(&results, &query, gaps.limit);
        }
        Command::Latest { region, gaps } => {
            let query = gaps.query()?;
            let store = Store::new(&config);
            let results = store.get_latest_results(&region).await?;
            print_gaps(&results, &query, gaps.limit);
        }
        Command::Recommendations {
            region,
            priority,
            kind,
            sort,
        } => {
            let query = RecommendationQuery {
                priority,
                kind,
                sort_by: sort.parse::<RecommendationSort>()?,
            };
            let store = Store::new(&config);
            let results = store.get_latest_results(&region).await?;
            print_recommendations(&results, &query);
        }
        Command::Chat { region, message } => {
            let message = message.join(" ");
            if message.trim().is_empty() {
                eprintln!("❌ Nothing to ask.");
                return Ok(());
            }

            // Answers are better grounded with the current counts, but the
            // assistant works without them.
            let store = Store::new(&config);
            let results = store.get_latest_results(&region).await.ok();
            let mut session = ChatSession::new(ChatClient::new(config.chatbot_base_url.clone()));
            let reply = session
                .ask(&message, ChatContext::from_results(results.as_ref()))
                .await;

            println!("{}", reply.message);
            for suggestion in &reply.suggestions {
                println!("  💡 {}", suggestion);
            }
        }
        Command::Surveys => {
            let listing = SurveyClient::new(config.survey_base_url.clone()).list().await?;
            println!("{} survey report(s)", listing.total);
            for survey in &listing.surveys {
                let city = survey["location"]["city"].as_str().unwrap_or("?");
                let issue = survey["issue"]["type"].as_str().unwrap_or("?");
                let severity = survey["issue"]["severity"].as_str().unwrap_or("?");
                let ai = if survey.get("ai_recommendation").map_or(false, |r| !r.is_null()) {
                    " 🤖"
                } else {
                    ""
                };
                println!(
                    "  {:<14} {:<24} {:<10} {}{}",
                    survey["id"].as_str().unwrap_or("-"),
                    utils::truncate(city, 24),
                    severity,
                    issue,
                    ai
                );
            }
        }
        Command::Survey {
            city,
            lat,
            lng,
            issue_type,
            severity,
            description,
        } => {
            let submission = SurveySubmission {
                location: SurveyLocation {
                    city,
                    coordinates: Some(Coordinates { lat, lng }),
                    full_address: None,
                },
                issue: SurveyIssue {
                    kind: issue_type,
                    severity: severity.clone(),
                    description,
                    extra: Map::new(),
                },
                ..SurveySubmission::default()
            };
            let receipt = SurveyClient::new(config.survey_base_url.clone())
                .submit(&submission)
                .await?;
            let plan = ResponsePlan::from_receipt(&receipt, &severity);

            println!("✅ Survey {} submitted.", receipt.survey_id.as_deref().unwrap_or("-"));
            println!("{}", plan.summary);
            for step in &plan.recommendations {
                println!("\n{} [{} | {} | {}]", step.title, step.priority, step.timeline, step.cost_estimate);
                println!("{}", step.description);
                for action in &step.implementation_steps {
                    println!("  - {}", action);
                }
            }
        }
    }

    Ok(())
}

/// Submits the job, echoes notices and stage changes, and waits until the
/// store stops loading.
async fn run_analysis(
    store: &Store,
    kind: &str,
    region: &str,
    no_summary: bool,
) -> Result<AnalysisResults, Box<dyn std::error::Error>> {
    let mut state = store.subscribe();
    let mut notices = store.notices();

    let payload = AnalysisPayload {
        state: Some(region.to_string()),
        include_summary: Some(!no_summary),
    };
    let receipt = store.start_analysis(kind, payload).await?;
    println!("🔍 Job {} submitted", receipt.job_id);

    let mut last_stage: Option<String> = None;
    loop {
        tokio::select! {
            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = state.borrow_and_update().clone();
                if let Some(job) = current.active_jobs.iter().find(|j| j.job_id == receipt.job_id) {
                    let stage = format!("{} {}", job.status, job.stage.as_deref().unwrap_or(""));
                    if last_stage.as_deref() != Some(stage.as_str()) {
                        println!("   {}", stage.trim_end());
                        last_stage = Some(stage);
                    }
                }
                if !current.loading {
                    break;
                }
            }
            notice = notices.recv() => {
                if let Ok(notice) = notice {
                    match notice.level {
                        NoticeLevel::Success => println!("✅ {}", notice.message),
                        NoticeLevel::Error => eprintln!("❌ {}", notice.message),
                    }
                }
            }
        }
    }

    let finished = store.snapshot();
    store.shutdown();
    match (finished.results, finished.error) {
        (_, Some(error)) => Err(error.into()),
        (Some(results), None) => Ok(results),
        (None, None) => Err("analysis finished without results".into()),
    }
}

fn print_gaps(results: &AnalysisResults, query: &GapQuery, limit: usize) {
    let summary = views::severity_summary(Some(results));
    println!(
        "{} gaps: {} critical, {} high, {} moderate, {} low ({} from surveys)",
        summary.total, summary.critical, summary.high, summary.moderate, summary.low, summary.survey_based
    );

    let gaps = views::filtered_and_sorted_gaps(Some(results), query);
    println!("{} of {} gaps match", gaps.len(), summary.total);
    for gap in gaps.iter().take(limit) {
        println!(
            "{} {:<10} {:<28} {}",
            if gap.survey_based { "📋" } else { "  " },
            gap.severity.as_deref().unwrap_or("-"),
            utils::truncate(gap.location.as_deref().unwrap_or("-"), 28),
            gap.issue_type.as_deref().unwrap_or("-")
        );
    }

    let areas = views::ranked_priority_areas(Some(results));
    if !areas.is_empty() {
        println!(
            "\n{} priority areas (avg score {:.1}/10)",
            areas.len(),
            views::average_priority_score(Some(results))
        );
        for area in areas.iter().take(5) {
            println!(
                "  {:>4.1}  {}",
                area.priority_score,
                area.location.as_ref().map_or("-", |l| l.label())
            );
        }
    }
}

fn print_recommendations(results: &AnalysisResults, query: &RecommendationQuery) {
    let recs = views::filtered_and_sorted_recommendations(Some(results), query);
    println!("{} recommendation(s)", recs.len());
    for rec in recs {
        println!(
            "- {} [{} | {} | {}]",
            rec.title.as_deref().unwrap_or("Untitled"),
            rec.effective_priority().unwrap_or("-"),
            rec.cost_estimate.as_deref().unwrap_or("-"),
            rec.timeline.as_deref().unwrap_or("-")
        );
    }
}
