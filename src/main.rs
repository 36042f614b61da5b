use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use mongodb::options::ClientOptions;
use mongodb::Client;
use tracing::Instrument;

use flowdeck::{
    generate_correlation_id, init_telemetry, CreateTask, CreateWorkflow, EditTask, EditWorkflow,
    FlowdeckConfig, MongoWorkflowStore, Principal, Role, TaskStatus, WorkflowMutationService,
};

#[derive(Parser)]
#[command(name = "flowdeck")]
#[command(about = "Workflow and task administration over the document store")]
#[command(long_about = "Flowdeck maintains workflows and their ordered, embedded tasks with \
                        transactional multi-step mutations. Authentication happens upstream; \
                        this console fabricates the already-authenticated principal from flags.")]
struct Cli {
    /// Act as this principal
    #[arg(long = "as", value_name = "USERNAME", global = true, default_value = "admin")]
    username: String,

    /// Role of the acting principal
    #[arg(long, global = true, value_enum, default_value_t = RoleArg::Member)]
    role: RoleArg,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Operate on workflows
    Workflow {
        #[command(subcommand)]
        command: WorkflowCommands,
    },
    /// Operate on the tasks embedded in a workflow
    Task {
        #[command(subcommand)]
        command: TaskCommands,
    },
}

#[derive(Subcommand)]
enum WorkflowCommands {
    /// List the workflows owned by the acting principal
    List,
    /// Show one workflow, tasks included
    Show { id: String },
    /// Create a workflow owned by the acting principal
    Create { name: String },
    /// Rename a workflow
    Rename { id: String, name: String },
    /// Transfer a workflow to another user (owner only)
    Transfer { id: String, username: String },
    /// Delete a workflow and the tasks embedded in it
    Delete { id: String },
}

#[derive(Subcommand)]
enum TaskCommands {
    /// List a workflow's tasks, ascending by order
    List { workflow: String },
    /// Show one task
    Show { workflow: String, task: String },
    /// Append a task; it starts Pending with the next order value
    Add {
        workflow: String,
        name: String,
        #[arg(long)]
        description: Option<String>,
    },
    /// Rewrite a task's mutable fields
    Edit {
        workflow: String,
        task: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long, value_enum)]
        status: StatusArg,
        #[arg(long)]
        order: u32,
    },
    /// Remove a task from its workflow
    Rm { workflow: String, task: String },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum RoleArg {
    Member,
    Admin,
}

impl From<RoleArg> for Role {
    fn from(role: RoleArg) -> Self {
        match role {
            RoleArg::Member => Role::Member,
            RoleArg::Admin => Role::Admin,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum StatusArg {
    Pending,
    InProgress,
    Completed,
}

impl From<StatusArg> for TaskStatus {
    fn from(status: StatusArg) -> Self {
        match status {
            StatusArg::Pending => TaskStatus::Pending,
            StatusArg::InProgress => TaskStatus::InProgress,
            StatusArg::Completed => TaskStatus::Completed,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = FlowdeckConfig::load()?;
    init_telemetry(&config.observability.log_level, config.observability.json_logs)?;

    let mut options = ClientOptions::parse(&config.store.uri).await?;
    options.app_name = config.store.app_name.clone();
    let client = Client::with_options(options)?;
    let store = Arc::new(MongoWorkflowStore::new(client, &config.store.database));
    let service = WorkflowMutationService::new(store);

    let principal = Principal {
        username: cli.username.clone(),
        role: cli.role.into(),
    };
    let span = tracing::info_span!(
        "request",
        correlation.id = %generate_correlation_id(),
        username = %principal.username,
    );
    dispatch(cli.command, &service, &principal).instrument(span).await
}

async fn dispatch(
    command: Commands,
    service: &WorkflowMutationService<MongoWorkflowStore>,
    principal: &Principal,
) -> Result<()> {
    match command {
        Commands::Workflow { command } => match command {
            WorkflowCommands::List => print_json(&service.list_workflows(principal).await?),
            WorkflowCommands::Show { id } => print_json(&service.get_workflow(&id).await?),
            WorkflowCommands::Create { name } => {
                let id = service.create_workflow(principal, CreateWorkflow { name }).await?;
                println!("{id}");
                Ok(())
            }
            WorkflowCommands::Rename { id, name } => {
                print_json(&service.edit_workflow(principal, &id, EditWorkflow { name }).await?)
            }
            WorkflowCommands::Transfer { id, username } => {
                print_json(&service.transfer_workflow(principal, &id, &username).await?)
            }
            WorkflowCommands::Delete { id } => {
                service.delete_workflow(principal, &id).await?;
                println!("deleted {id}");
                Ok(())
            }
        },
        Commands::Task { command } => match command {
            TaskCommands::List { workflow } => print_json(&service.list_tasks(&workflow).await?),
            TaskCommands::Show { workflow, task } => {
                print_json(&service.get_task(&workflow, &task).await?)
            }
            TaskCommands::Add {
                workflow,
                name,
                description,
            } => {
                let id = service
                    .create_task(principal, &workflow, CreateTask { name, description })
                    .await?;
                println!("{id}");
                Ok(())
            }
            TaskCommands::Edit {
                workflow,
                task,
                name,
                description,
                status,
                order,
            } => print_json(
                &service
                    .edit_task(
                        principal,
                        &workflow,
                        &task,
                        EditTask {
                            name,
                            description,
                            status: status.into(),
                            order,
                        },
                    )
                    .await?,
            ),
            TaskCommands::Rm { workflow, task } => {
                service.delete_task(principal, &workflow, &task).await?;
                println!("deleted {task}");
                Ok(())
            }
        },
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
