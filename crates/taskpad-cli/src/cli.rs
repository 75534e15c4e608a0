use clap::{Parser, Subcommand};

use taskpad_core::models::{Priority, TaskStatus};

#[derive(Debug, Parser)]
#[command(name = "taskpad", version, about = "Manage your to-do list from the terminal")]
pub struct Cli {
    /// Without a command, taskpad starts an interactive shell
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Log in and store the session token
    Login {
        #[arg(long, short, env = "TASKPAD_EMAIL")]
        email: Option<String>,
    },
    /// Create an account
    Register {
        #[arg(long, short)]
        name: String,
        #[arg(long, short)]
        email: String,
    },
    /// End the session and forget the stored token
    Logout,
    /// Show the logged-in user and when the session expires
    Whoami,
    /// Ask the server whether the session token is still accepted
    Check,
    /// List tasks
    List {
        /// Hide completed tasks
        #[arg(long)]
        pending: bool,
    },
    /// Show one task
    Show { id: String },
    /// Create a task
    Add {
        title: String,
        #[arg(long, short)]
        description: Option<String>,
        #[arg(long, short)]
        priority: Option<Priority>,
        /// Due date (YYYY-MM-DD or RFC 3339)
        #[arg(long)]
        due: Option<String>,
        #[arg(long = "tag", short)]
        tags: Vec<String>,
    },
    /// Change fields of a task
    Update {
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long, short)]
        description: Option<String>,
        #[arg(long, short)]
        priority: Option<Priority>,
        #[arg(long, short)]
        status: Option<TaskStatus>,
        #[arg(long)]
        due: Option<String>,
        /// Replaces all tags
        #[arg(long = "tag", short)]
        tags: Vec<String>,
        /// Send a full replacement (PUT) instead of a partial update
        #[arg(long)]
        replace: bool,
    },
    /// Mark a task completed
    Done { id: String },
    /// Mark a task pending again
    Reopen { id: String },
    /// Delete a task
    Delete { id: String },
    /// Show task counters
    Stats,
    /// List user accounts
    Users,
    /// Show, change or delete a user account
    User {
        #[command(subcommand)]
        action: UserAction,
    },
    /// Interactive shell that keeps the session alive and warns before it expires
    Shell,
}

#[derive(Debug, Subcommand)]
pub enum UserAction {
    /// Show one account
    Show { id: String },
    /// Change name or email
    Update {
        id: String,
        #[arg(long, short)]
        name: Option<String>,
        #[arg(long, short)]
        email: Option<String>,
    },
    /// Delete an account; deleting your own also logs you out
    Delete { id: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_add_with_options() {
        let cli = Cli::try_parse_from([
            "taskpad", "add", "Buy milk", "-p", "urgent", "--due", "2024-03-10", "-t", "home",
            "-t", "errand",
        ])
        .unwrap();
        match cli.command {
            Some(Command::Add {
                title,
                priority,
                due,
                tags,
                ..
            }) => {
                assert_eq!(title, "Buy milk");
                assert_eq!(priority, Some(Priority::Urgent));
                assert_eq!(due.as_deref(), Some("2024-03-10"));
                assert_eq!(tags, vec!["home", "errand"]);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_update_status() {
        let cli =
            Cli::try_parse_from(["taskpad", "update", "65f0", "--status", "in-progress"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Command::Update {
                status: Some(TaskStatus::InProgress),
                replace: false,
                ..
            })
        ));
    }

    #[test]
    fn test_invalid_priority_is_rejected() {
        assert!(Cli::try_parse_from(["taskpad", "add", "x", "-p", "someday"]).is_err());
    }

    #[test]
    fn test_parse_user_actions() {
        let cli = Cli::try_parse_from(["taskpad", "user", "update", "u1", "--name", "Ada L"])
            .unwrap();
        match cli.command {
            Some(Command::User {
                action: UserAction::Update { id, name, email },
            }) => {
                assert_eq!(id, "u1");
                assert_eq!(name.as_deref(), Some("Ada L"));
                assert!(email.is_none());
            }
            other => panic!("unexpected command: {:?}", other),
        }

        let cli = Cli::try_parse_from(["taskpad", "users"]).unwrap();
        assert!(matches!(cli.command, Some(Command::Users)));
        assert!(Cli::try_parse_from(["taskpad", "user", "delete"]).is_err());
    }

    #[test]
    fn test_no_command_means_shell() {
        let cli = Cli::try_parse_from(["taskpad"]).unwrap();
        assert!(cli.command.is_none());
    }
}
