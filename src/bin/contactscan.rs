use anyhow::{anyhow, Context, Result};
use clap::{ArgGroup, Parser, Subcommand};
use contactscan::db::{Database, RecordQuery, DEFAULT_JOB_LIMIT};
use contactscan::duplicate::{DuplicateDetector, DEFAULT_SIMILARITY_THRESHOLD};
use contactscan::environment::Settings;
use contactscan::export::{ExportFilter, ExportSummary};
use contactscan::logging::configure_logging;
use contactscan::pipeline::{DocumentProcessor, GroupSize, JobRunner, JobStatus};
use contactscan::recognition::{Document, HttpRecognitionClient};
use contactscan::record::{ContactRecord, RecordUpdate};
use prettytable::{Cell, Row as PrettyRow, Table};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::main;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Parser)]
#[command(author, version, about = "Extract contact records from scanned documents", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run recognition over documents and store the extracted records
    Process {
        /// Documents per group (1-100); defaults to DEFAULT_GROUP_SIZE
        #[arg(short, long)]
        group_size: Option<usize>,

        /// Documents to process
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Show a processing job
    Job {
        /// Job ID
        id: Uuid,
    },

    /// List processing jobs, newest first
    Jobs {
        #[arg(short, long, value_parser = ["pending", "processing", "completed", "failed", "cancelled"])]
        status: Option<String>,

        #[arg(short, long, default_value_t = DEFAULT_JOB_LIMIT)]
        limit: i64,

        #[arg(short, long, default_value = "0")]
        offset: i64,
    },

    /// Cancel a pending or processing job
    Cancel {
        /// Job ID
        id: Uuid,
    },

    /// Delete a job with its records and duplicate groups
    DeleteJob {
        /// Job ID
        id: Uuid,
    },

    /// List records
    Records {
        /// Only records from this job
        #[arg(short, long)]
        job: Option<Uuid>,

        #[arg(long)]
        include_duplicates: bool,

        #[arg(long)]
        include_invalid: bool,

        /// Maximum number of records to show
        #[arg(short, long, default_value = "100")]
        limit: i64,
    },

    /// Record counts for a job, or for everything
    Summary {
        #[arg(short, long)]
        job: Option<Uuid>,
    },

    /// List duplicate groups for a job
    Duplicates {
        #[arg(short, long)]
        job: Uuid,
    },

    /// Keep one record of a duplicate group and flag the others
    Resolve {
        /// Duplicate group ID
        #[arg(short, long)]
        group: Uuid,

        /// Record to keep
        #[arg(short, long)]
        keep: Uuid,
    },

    /// Find records similar to a record within its job
    Similar {
        #[arg(short, long)]
        record: Uuid,

        /// Minimum similarity score (0.0-1.0)
        #[arg(short, long, default_value_t = DEFAULT_SIMILARITY_THRESHOLD)]
        threshold: f64,
    },

    /// Edit a record after manual review
    Edit {
        /// Record ID
        id: Uuid,

        #[arg(long)]
        first_name: Option<String>,

        #[arg(long)]
        last_name: Option<String>,

        #[arg(long)]
        mobile: Option<String>,

        /// Empty string clears the landline
        #[arg(long)]
        landline: Option<String>,

        #[arg(long)]
        address: Option<String>,

        /// Empty string clears the email
        #[arg(long)]
        email: Option<String>,

        #[arg(long)]
        notes: Option<String>,
    },

    /// Mark records valid or invalid
    #[command(group(ArgGroup::new("validity").required(true).args(["valid", "invalid"])))]
    Validate {
        #[arg(long)]
        valid: bool,

        #[arg(long)]
        invalid: bool,

        /// Record IDs
        #[arg(required = true)]
        ids: Vec<Uuid>,
    },

    /// Delete records
    Delete {
        /// Record IDs
        #[arg(required = true)]
        ids: Vec<Uuid>,
    },

    /// Show what an export of a job would contain
    Export {
        #[arg(short, long)]
        job: Uuid,

        #[arg(long)]
        include_duplicates: bool,

        #[arg(long)]
        include_invalid: bool,
    },
}

#[main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = Settings::from_env().context("Invalid configuration")?;

    // Initialize tracing
    configure_logging(&settings.log_dir);

    let db = Database::new(&settings.database_path)
        .await
        .context("Failed to connect to database")?;

    match cli.command {
        Commands::Process { group_size, files } => {
            process(&db, &settings, group_size, &files).await?;
        }

        Commands::Job { id } => {
            let job = db.get_job(id).await?.ok_or_else(|| anyhow!("No job with ID {}", id))?;
            let mut table = Table::new();
            add_header(&mut table, &["Field", "Value"]);
            for (field, value) in [
                ("ID", job.id.to_string()),
                ("Status", job.status.to_string()),
                ("Group size", job.group_size.to_string()),
                ("Files", format!("{}/{}", job.processed_files, job.total_files)),
                ("Records", job.total_records.to_string()),
                ("Duplicates", job.duplicates_found.to_string()),
                ("Created", job.created_at.to_rfc3339()),
                ("Completed", job.completed_at.map(|t| t.to_rfc3339()).unwrap_or_default()),
                ("Error", job.error_message.unwrap_or_default()),
            ] {
                add_cells(&mut table, &[field.to_string(), value]);
            }
            table.printstd();
        }

        Commands::Jobs { status, limit, offset } => {
            let status = status.as_deref().map(JobStatus::from);
            let jobs = db.list_jobs(status, limit, offset).await?;
            if jobs.is_empty() {
                println!("No jobs found");
                return Ok(());
            }

            let mut table = Table::new();
            add_header(&mut table, &["ID", "Status", "Files", "Records", "Duplicates", "Created"]);
            for job in jobs {
                add_cells(
                    &mut table,
                    &[
                        job.id.to_string(),
                        job.status.to_string(),
                        format!("{}/{}", job.processed_files, job.total_files),
                        job.total_records.to_string(),
                        job.duplicates_found.to_string(),
                        job.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
                    ],
                );
            }
            table.printstd();
        }

        Commands::Cancel { id } => {
            if db.cancel_job(id).await? {
                println!("Cancelled job {}", id);
            } else {
                println!("Nothing changed: job {} not found or no longer active", id);
            }
        }

        Commands::DeleteJob { id } => {
            if db.delete_job(id).await? {
                println!("Deleted job {}", id);
            } else {
                println!("No job with ID {}", id);
            }
        }

        Commands::Records {
            job,
            include_duplicates,
            include_invalid,
            limit,
        } => {
            let records = db
                .list_records(&RecordQuery {
                    job_id: job,
                    include_duplicates,
                    include_invalid,
                    limit: Some(limit),
                    offset: 0,
                })
                .await?;
            print_records(&records);
        }

        Commands::Summary { job } => {
            let summary = db.records_summary(job).await?;
            let mut table = Table::new();
            add_header(&mut table, &["Total", "Valid", "Invalid", "Duplicates", "Reviewed", "Unreviewed"]);
            add_cells(
                &mut table,
                &[
                    summary.total.to_string(),
                    summary.valid.to_string(),
                    summary.invalid.to_string(),
                    summary.duplicates.to_string(),
                    summary.reviewed.to_string(),
                    summary.unreviewed.to_string(),
                ],
            );
            table.printstd();
        }

        Commands::Duplicates { job } => {
            let groups = db.list_duplicate_groups(job).await?;
            if groups.is_empty() {
                println!("No duplicate groups for job {}", job);
                return Ok(());
            }

            let mut table = Table::new();
            add_header(&mut table, &["Group", "Mobile", "Records", "Kept", "Resolved", "Action"]);
            for stored in &groups {
                add_cells(
                    &mut table,
                    &[
                        stored.id.to_string(),
                        stored.group.mobile_number.clone(),
                        stored.group.record_count().to_string(),
                        stored
                            .group
                            .canonical()
                            .map(|r| format!("{} ({})", r.name.full(), r.id))
                            .unwrap_or_default(),
                        stored.is_resolved.to_string(),
                        stored.resolution_action.map(|a| a.to_string()).unwrap_or_default(),
                    ],
                );
            }
            table.printstd();
        }

        Commands::Resolve { group, keep } => {
            if db.resolve_duplicate_group(group, keep).await? {
                println!("Resolved group {}: kept record {}", group, keep);
            } else {
                println!("Nothing changed: group {} not found or record {} is not a member", group, keep);
            }
        }

        Commands::Similar { record, threshold } => {
            let probe = db
                .get_record(record)
                .await?
                .ok_or_else(|| anyhow!("No record with ID {}", record))?;
            let pool = match probe.job_id {
                Some(job_id) => db.list_records(&RecordQuery::all_for_job(job_id)).await?,
                None => vec![probe.clone()],
            };

            let similar = DuplicateDetector::new().similar_records(&probe, &pool, threshold);
            if similar.is_empty() {
                println!("No records at or above {:.2} similarity", threshold);
                return Ok(());
            }

            let mut table = Table::new();
            add_header(&mut table, &["Score", "ID", "Name", "Mobile", "Address"]);
            for candidate in similar {
                add_cells(
                    &mut table,
                    &[
                        format!("{:.3}", candidate.score),
                        candidate.record.id.to_string(),
                        candidate.record.name.full(),
                        candidate.record.mobile.to_string(),
                        candidate.record.address.to_string(),
                    ],
                );
            }
            table.printstd();
        }

        Commands::Edit {
            id,
            first_name,
            last_name,
            mobile,
            landline,
            address,
            email,
            notes,
        } => {
            let update = RecordUpdate {
                first_name,
                last_name,
                mobile,
                landline,
                address,
                email,
                reviewer_notes: notes,
                is_reviewed: Some(true),
                ..Default::default()
            };
            match db.update_record(id, &update).await? {
                Some(record) => print_records(&[record]),
                None => println!("No record with ID {}", id),
            }
        }

        Commands::Validate { valid, invalid, ids } => {
            let is_valid = valid && !invalid;
            let updated = db.bulk_set_validity(&ids, is_valid).await?;
            println!("Updated {} of {} records", updated, ids.len());
        }

        Commands::Delete { ids } => {
            let deleted = db.bulk_delete_records(&ids).await?;
            println!("Deleted {} of {} records", deleted, ids.len());
        }

        Commands::Export {
            job,
            include_duplicates,
            include_invalid,
        } => {
            let filter = ExportFilter {
                include_duplicates,
                include_invalid,
                ..ExportFilter::for_job(job)
            };
            let records = db.list_records(&filter.candidate_query()).await?;
            let summary = ExportSummary::new(&records, &filter);

            let mut table = Table::new();
            add_header(&mut table, &["Total Records", "Filtered Records", "Duplicates", "Export Date"]);
            add_cells(
                &mut table,
                &[
                    summary.total.to_string(),
                    summary.filtered.to_string(),
                    summary.duplicates.to_string(),
                    summary.exported_at.format("%Y-%m-%d %H:%M:%S").to_string(),
                ],
            );
            table.printstd();
        }
    }

    Ok(())
}

async fn process(db: &Database, settings: &Settings, group_size: Option<usize>, files: &[PathBuf]) -> Result<()> {
    let group_size = GroupSize::new(group_size.unwrap_or(settings.default_group_size))?;
    let client = HttpRecognitionClient::from_settings(settings)?;

    let mut documents = Vec::with_capacity(files.len());
    for path in files {
        match Document::load(path, settings).await {
            Ok(document) => documents.push(document),
            Err(e) => warn!("Skipping {}: {:#}", path.display(), e),
        }
    }
    if documents.is_empty() {
        return Err(anyhow!("No valid documents to process"));
    }

    let job = db.create_job(group_size, documents.len()).await?;
    info!("Started job {} with {} documents", job.id, documents.len());

    let processor = DocumentProcessor::new(Arc::new(client), settings.max_concurrent_requests);
    let report = JobRunner::new(processor, Arc::new(db.clone()))
        .with_group_size(group_size)
        .run(job.id, &documents)
        .await?;

    if report.cancelled {
        println!("Job {} was cancelled; no records were saved", report.job_id);
        return Ok(());
    }

    let mut table = Table::new();
    add_header(&mut table, &["Job", "Files", "Processed", "Failed", "Records", "Duplicates"]);
    add_cells(
        &mut table,
        &[
            report.job_id.to_string(),
            report.total_files.to_string(),
            report.processed_files.to_string(),
            report.failed_files.to_string(),
            report.records_extracted.to_string(),
            report.duplicates_found.to_string(),
        ],
    );
    table.printstd();
    Ok(())
}

fn print_records(records: &[ContactRecord]) {
    if records.is_empty() {
        println!("No records found");
        return;
    }

    let mut table = Table::new();
    add_header(
        &mut table,
        &["ID", "First", "Last", "Mobile", "Address", "Email", "Source", "Dup", "Valid", "Reviewed"],
    );
    for record in records {
        add_cells(
            &mut table,
            &[
                record.id.to_string(),
                record.first_name().to_string(),
                record.last_name().to_string(),
                record.mobile.to_string(),
                record.address.to_string(),
                record.email.as_ref().map(|e| e.to_string()).unwrap_or_default(),
                record.source_file.clone().unwrap_or_default(),
                record.is_duplicate.to_string(),
                record.is_valid.to_string(),
                record.is_reviewed.to_string(),
            ],
        );
    }
    table.printstd();
}

fn add_header(table: &mut Table, titles: &[&str]) {
    table.add_row(PrettyRow::new(titles.iter().map(|t| Cell::new(t).style_spec("b")).collect()));
}

fn add_cells(table: &mut Table, values: &[String]) {
    table.add_row(PrettyRow::new(values.iter().map(|v| Cell::new(v)).collect()));
}
