use casebook_core::models::{CaseFilter, NewPrincipal};
use casebook_core::{
    max_revision_requests_from_env_value, Casebook, CoreConfig, NewCase, NewDocument,
};
use casebook_policy::{AccessControl, Role, Visibility};
use casebook_types::NonEmptyText;
use casebook_uuid::RecordId;
use casebook_workflow::{CaseStatus, EvaluationInput, TransitionPayload, Trigger};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "casebook")]
#[command(about = "Casebook clinical case review CLI")]
struct Cli {
    /// Data directory (overrides CASEBOOK_DATA_DIR)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// List registered principals
    ListPrincipals,
    /// Register a principal
    AddPrincipal {
        name: String,
        email: String,
        /// student, staff, manager or super_admin
        #[arg(long, default_value = "student")]
        role: String,
        #[arg(long)]
        department: Option<String>,
        /// Send email copies of notifications
        #[arg(long)]
        email_notifications: bool,
    },
    /// Deactivate a principal; their records are kept
    DeactivatePrincipal { principal_id: String },
    /// Create a draft case
    CreateCase {
        /// Acting principal
        #[arg(long = "as")]
        actor: String,
        title: String,
        /// Owning student, when a manager creates on their behalf
        #[arg(long)]
        student: Option<String>,
        #[arg(long)]
        history: Option<String>,
        #[arg(long)]
        details: Option<String>,
    },
    /// List cases visible to the actor
    ListCases {
        #[arg(long = "as")]
        actor: String,
        #[arg(long)]
        status: Option<String>,
    },
    /// Print a case as YAML, with the triggers the actor could fire
    ShowCase {
        #[arg(long = "as")]
        actor: String,
        case_id: String,
    },
    /// Fire a workflow trigger
    Transition {
        #[arg(long = "as")]
        actor: String,
        case_id: String,
        /// submit, assign, start_review, request_revision, complete_review, reject or archive
        trigger: String,
        #[arg(long)]
        note: Option<String>,
        #[arg(long)]
        assignee: Option<String>,
        /// Revision description (request_revision)
        #[arg(long)]
        revision: Option<String>,
        /// Score (complete_review)
        #[arg(long)]
        score: Option<f64>,
        #[arg(long)]
        max_score: Option<f64>,
        #[arg(long)]
        feedback: Option<String>,
    },
    /// Evaluate document access
    EvaluateAccess {
        #[arg(long = "as")]
        actor: String,
        document_id: String,
        /// Principal to evaluate for; defaults to the actor
        #[arg(long)]
        principal: Option<String>,
    },
    /// List the actor's notifications
    Notifications {
        #[arg(long = "as")]
        actor: String,
        #[arg(long)]
        unread: bool,
    },
    /// Upload a new document as version 1
    CreateDocument {
        #[arg(long = "as")]
        actor: String,
        title: String,
        file: PathBuf,
        #[arg(long)]
        description: Option<String>,
        /// public, private or restricted
        #[arg(long, default_value = "private")]
        visibility: String,
        #[arg(long = "allow-role")]
        allowed_roles: Vec<String>,
        #[arg(long = "allow-user")]
        allowed_users: Vec<String>,
        #[arg(long = "allow-department")]
        allowed_departments: Vec<String>,
    },
    /// Upload a new version of a document
    AddVersion {
        #[arg(long = "as")]
        actor: String,
        document_id: String,
        file: PathBuf,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Write a document version to a file
    Download {
        #[arg(long = "as")]
        actor: String,
        document_id: String,
        output: PathBuf,
        /// Defaults to the current version
        #[arg(long)]
        version: Option<u32>,
    },
}

fn open_casebook(data_dir: Option<PathBuf>) -> Result<Casebook, Box<dyn std::error::Error>> {
    let data_dir = data_dir
        .or_else(|| std::env::var("CASEBOOK_DATA_DIR").ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(casebook_core::constants::DEFAULT_DATA_DIR));
    let public_url = std::env::var("CASEBOOK_PUBLIC_URL")
        .unwrap_or_else(|_| casebook_core::constants::DEFAULT_PUBLIC_BASE_URL.into());
    let max_revisions =
        max_revision_requests_from_env_value(std::env::var("CASEBOOK_MAX_REVISION_REQUESTS").ok())?;

    let cfg = Arc::new(CoreConfig::new(data_dir, public_url, max_revisions)?);
    Ok(Casebook::open(cfg)?)
}

fn id(raw: &str) -> Result<RecordId, Box<dyn std::error::Error>> {
    Ok(RecordId::parse(raw)?)
}

fn optional_id(raw: Option<String>) -> Result<Option<RecordId>, Box<dyn std::error::Error>> {
    raw.as_deref().map(id).transpose()
}

fn access_control(
    visibility: &str,
    roles: Vec<String>,
    users: Vec<String>,
    departments: Vec<String>,
) -> Result<AccessControl, Box<dyn std::error::Error>> {
    Ok(AccessControl {
        visibility: visibility.parse::<Visibility>()?,
        allowed_roles: roles
            .iter()
            .map(|r| r.parse::<Role>())
            .collect::<Result<_, _>>()?,
        allowed_users: users
            .iter()
            .map(|u| RecordId::parse(u))
            .collect::<Result<_, _>>()?,
        allowed_departments: departments
            .iter()
            .map(NonEmptyText::new)
            .collect::<Result<_, _>>()?,
    })
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("casebook=warn".parse()?),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let Some(command) = cli.command else {
        println!("Use 'casebook --help' for commands");
        return Ok(());
    };
    let casebook = open_casebook(cli.data_dir)?;

    match command {
        Commands::ListPrincipals => {
            let principals = casebook.principals.list()?;
            if principals.is_empty() {
                println!("No principals found.");
            }
            for p in principals {
                println!(
                    "{}  {:<12} {:<24} {} {}",
                    p.id,
                    p.role,
                    p.name,
                    p.department.as_ref().map_or("-", |d| d.as_str()),
                    if p.active { "" } else { "(inactive)" }
                );
            }
        }
        Commands::AddPrincipal {
            name,
            email,
            role,
            department,
            email_notifications,
        } => {
            let record = casebook.principals.register(NewPrincipal {
                name,
                email,
                role: role.parse()?,
                department,
                email_notifications,
            })?;
            println!("Registered {} with id: {}", record.role, record.id);
        }
        Commands::DeactivatePrincipal { principal_id } => {
            let record = casebook.principals.set_active(id(&principal_id)?, false)?;
            println!("Deactivated {}", record.id);
        }
        Commands::CreateCase {
            actor,
            title,
            student,
            history,
            details,
        } => {
            let case = casebook.cases.create_case(
                id(&actor)?,
                NewCase {
                    student: optional_id(student)?,
                    title,
                    medical_history: history.unwrap_or_default(),
                    case_details: details.unwrap_or_default(),
                    ..NewCase::default()
                },
            )?;
            println!("Created {} with id: {}", case.case_number, case.id);
        }
        Commands::ListCases { actor, status } => {
            let filter = CaseFilter {
                status: status.as_deref().map(str::parse::<CaseStatus>).transpose()?,
                ..CaseFilter::default()
            };
            let cases = casebook.cases.list_cases(id(&actor)?, filter)?;
            if cases.is_empty() {
                println!("No cases found.");
            }
            for case in cases {
                println!(
                    "{}  {}  {:<18} {}",
                    case.id, case.case_number, case.status, case.content.title
                );
            }
        }
        Commands::ShowCase { actor, case_id } => {
            let actor = id(&actor)?;
            let case_id = id(&case_id)?;
            let case = casebook.cases.get_case(actor, case_id)?;
            let triggers = casebook.cases.available_triggers(actor, case_id)?;
            print!("{}", serde_yaml::to_string(&case)?);
            let triggers: Vec<&str> = triggers.iter().map(|t| t.as_str()).collect();
            println!("# available: {}", triggers.join(", "));
        }
        Commands::Transition {
            actor,
            case_id,
            trigger,
            note,
            assignee,
            revision,
            score,
            max_score,
            feedback,
        } => {
            let trigger: Trigger = trigger.parse()?;
            let evaluation = (score.is_some() || max_score.is_some() || feedback.is_some())
                .then(|| EvaluationInput {
                    score,
                    max_score,
                    feedback,
                    rubric: Vec::new(),
                });
            let payload = TransitionPayload {
                note,
                assignee: optional_id(assignee)?,
                revision_description: revision,
                evaluation,
            };

            let outcome =
                casebook
                    .cases
                    .attempt_transition(id(&case_id)?, trigger, id(&actor)?, payload)?;
            println!(
                "{} is now {} ({} notification(s))",
                outcome.case.case_number,
                outcome.case.status,
                outcome.notifications.len()
            );
            for warning in outcome.warnings {
                eprintln!("warning: {warning}");
            }
        }
        Commands::EvaluateAccess {
            actor,
            document_id,
            principal,
        } => {
            let decision = casebook.documents.evaluate_access(
                id(&actor)?,
                id(&document_id)?,
                optional_id(principal)?,
            )?;
            println!("can_read: {}", decision.can_read);
            println!("can_edit: {}", decision.can_edit);
        }
        Commands::Notifications { actor, unread } => {
            let notifications = casebook
                .notifications
                .list_for_recipient(id(&actor)?, unread)?;
            if notifications.is_empty() {
                println!("No notifications.");
            }
            for n in notifications {
                println!(
                    "{} {} [{}] {}",
                    if n.is_read { " " } else { "*" },
                    n.created_at.format("%Y-%m-%d %H:%M"),
                    n.title,
                    n.message
                );
            }
        }
        Commands::CreateDocument {
            actor,
            title,
            file,
            description,
            visibility,
            allowed_roles,
            allowed_users,
            allowed_departments,
        } => {
            let bytes = std::fs::read(&file)?;
            let filename = file
                .file_name()
                .map(|f| f.to_string_lossy().into_owned())
                .unwrap_or_else(|| "upload".into());
            let document = casebook.documents.create_document(
                id(&actor)?,
                NewDocument {
                    title,
                    description,
                    access_control: access_control(
                        &visibility,
                        allowed_roles,
                        allowed_users,
                        allowed_departments,
                    )?,
                    filename,
                    change_notes: None,
                },
                &bytes,
            )?;
            println!("Created {} with id: {}", document.document_number, document.id);
        }
        Commands::AddVersion {
            actor,
            document_id,
            file,
            notes,
        } => {
            let bytes = std::fs::read(&file)?;
            let filename = file
                .file_name()
                .map(|f| f.to_string_lossy().into_owned())
                .unwrap_or_else(|| "upload".into());
            let document = casebook.documents.add_version(
                id(&actor)?,
                id(&document_id)?,
                &bytes,
                &filename,
                notes,
            )?;
            println!(
                "{} is now at version {}",
                document.document_number, document.current_version
            );
        }
        Commands::Download {
            actor,
            document_id,
            output,
            version,
        } => {
            let download =
                casebook
                    .documents
                    .download(id(&actor)?, id(&document_id)?, version, None)?;
            std::fs::write(&output, &download.bytes)?;
            println!(
                "Wrote version {} ({} bytes) to {}",
                download.version.version,
                download.bytes.len(),
                output.display()
            );
        }
    }

    Ok(())
}
