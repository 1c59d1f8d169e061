use approval_core::config::{config_from_env_values, EnvValues};
use approval_core::{
    CcAction, Category, DetailStatus, Document, DocumentDraft, DocumentService, Feedback,
    ReopenRole,
};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "approval")]
#[command(about = "BPB / Helpdesk document approval CLI")]
struct Cli {
    /// Data directory (overrides APPROVAL_DATA_DIR)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
    /// Username the command runs as
    #[arg(long, global = true, default_value = "")]
    actor: String,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Replace the org tree from a YAML file with `users` and `departments`
    ImportOrg {
        /// Seed file
        path: PathBuf,
    },
    /// Publish a document from a YAML draft
    Create {
        /// Draft file (kind, origin, recipient, subject, details, cc)
        path: PathBuf,
    },
    /// Replace a document's header, details and chain from a YAML draft
    Revise {
        number: String,
        path: PathBuf,
        #[arg(long)]
        note: Option<String>,
    },
    /// Respond on a CC line
    Feedback {
        number: String,
        /// Zero-based CC line
        line: usize,
        /// APPROVE, REVISION, REJECT, REQUESTING_REVIEW or NO_ACTION
        action: String,
        #[arg(long)]
        comment: Option<String>,
        /// Mention (repeatable)
        #[arg(long = "mention")]
        mentions: Vec<String>,
        #[arg(long)]
        attachment: Option<String>,
    },
    /// Answer the open review request
    Reply {
        number: String,
        comment: String,
        #[arg(long = "mention")]
        mentions: Vec<String>,
    },
    /// Put a document back into circulation
    Reopen {
        number: String,
        /// publisher, recipient or cc<n>
        role: String,
        #[arg(long)]
        comment: Option<String>,
    },
    /// Remind the current approver
    FollowUp { number: String },
    /// Set a detail line's sub-status
    SetDetail {
        number: String,
        /// Zero-based detail line
        line: usize,
        /// PENDING, IN_PROGRESS or DONE
        status: String,
    },
    /// Store a local file as an attachment of a document
    Attach { number: String, path: PathBuf },
    /// List documents in a category
    List {
        #[arg(default_value = "all")]
        category: String,
    },
    /// Show one document
    Show { number: String },
    /// List unread notifications
    Notifications,
    /// Clear the unread notification on a document
    MarkRead { number: String },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let Some(command) = cli.command else {
        println!("No command given. Use --help to see available commands.");
        return Ok(());
    };

    let mut env = EnvValues::from_process();
    if let Some(dir) = cli.data_dir {
        env.data_dir = Some(dir.display().to_string());
    }
    let service = DocumentService::new(Arc::new(config_from_env_values(env)?))?;
    let actor = cli.actor.as_str();

    match command {
        Commands::ImportOrg { path } => {
            let (users, departments) = service.org().import(&std::fs::read_to_string(path)?)?;
            println!("Imported {users} users and {departments} departments");
        }
        Commands::Create { path } => {
            let draft = read_draft(&path)?;
            let doc = service.create(&draft, actor)?;
            println!("Created {}", doc.number);
        }
        Commands::Revise { number, path, note } => {
            let draft = read_draft(&path)?;
            let doc = service.revise(&number, &draft, note.as_deref(), actor)?;
            print_document(&service, &doc);
        }
        Commands::Feedback {
            number,
            line,
            action,
            comment,
            mentions,
            attachment,
        } => {
            let feedback = Feedback {
                line_number: line,
                action: action.parse::<CcAction>()?,
                attachment,
                comment,
                mentions,
            };
            let doc = service.apply_feedback(&number, feedback, actor)?;
            print_document(&service, &doc);
        }
        Commands::Reply {
            number,
            comment,
            mentions,
        } => {
            let doc = service.reply_for_review(&number, &comment, mentions, actor)?;
            print_document(&service, &doc);
        }
        Commands::Reopen {
            number,
            role,
            comment,
        } => {
            let role = role.parse::<ReopenRole>()?;
            let doc = service.reopen(&number, role, comment.as_deref(), actor)?;
            print_document(&service, &doc);
        }
        Commands::FollowUp { number } => {
            service.follow_up(&number, actor)?;
            println!("Reminder sent for {number}");
        }
        Commands::SetDetail {
            number,
            line,
            status,
        } => {
            let status = status.parse::<DetailStatus>()?;
            let doc = service.set_detail_status(&number, line, status, actor)?;
            print_document(&service, &doc);
        }
        Commands::Attach { number, path } => {
            let filename = path
                .file_name()
                .and_then(|n| n.to_str())
                .ok_or("attachment path has no file name")?
                .to_string();
            let metadata = service.attach(&number, &filename, &std::fs::read(&path)?, actor)?;
            println!(
                "Stored {} ({} bytes, sha256 {})",
                metadata.relative_path.as_str(),
                metadata.size_bytes,
                metadata.hash
            );
        }
        Commands::List { category } => {
            let documents = service.list_by_selection(actor, category.parse::<Category>()?)?;
            if documents.is_empty() {
                println!("No documents found.");
            }
            for doc in documents {
                let label = service.config().policy(doc.kind).status_label(doc.status);
                println!("{}  {:<11}  {}", doc.number, label, doc.subject);
            }
        }
        Commands::Show { number } => {
            let doc = service.get(&number, actor)?;
            print_document(&service, &doc);
        }
        Commands::Notifications => {
            for pending in service.notifications_for(actor)? {
                println!(
                    "{}  {}  {}",
                    pending.created_at.to_rfc3339(),
                    pending.number,
                    pending.subject
                );
            }
        }
        Commands::MarkRead { number } => {
            if service.mark_read(&number, actor)? {
                println!("Marked {number} as read");
            } else {
                println!("No unread notification on {number}");
            }
        }
    }

    Ok(())
}

fn read_draft(path: &Path) -> Result<DocumentDraft, Box<dyn std::error::Error>> {
    let text = std::fs::read_to_string(path)?;
    Ok(serde_yaml::from_str(&text)?)
}

fn print_document(service: &DocumentService, doc: &Document) {
    let policy = service.config().policy(doc.kind);
    println!("{} [{}] {}", doc.number, policy.status_label(doc.status), doc.subject);
    println!("  from {} to {}", doc.origin, doc.recipient);
    for entry in doc.cc_list.entries() {
        println!(
            "  cc{} {:<8} {}",
            entry.line_number + 1,
            entry.approver_code,
            entry.action
        );
    }
    for detail in &doc.details {
        println!(
            "  - {} x{} {}",
            detail.item, detail.quantity, detail.sub_status
        );
    }
    for note in doc.notes.notes() {
        println!("  #{} {}: {}", note.line_number, note.author, note.comment);
    }
}
