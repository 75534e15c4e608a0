//! Command execution and terminal output.

use std::io::{self, Write};

use anyhow::{bail, Context, Result};
use chrono::Local;

use taskpad_core::models::{Task, TaskCreate, TaskStats, TaskUpdate, User, UserUpdate};
use taskpad_core::utils::{format_date, format_remaining, truncate_string};

use crate::app::App;
use crate::cli::{Command, UserAction};

/// Width of the title column in task listings
const TITLE_WIDTH: usize = 40;

/// Width of the id column in task listings
const ID_WIDTH: usize = 24;

/// Environment variable consulted before prompting for a password
const ENV_PASSWORD: &str = "TASKPAD_PASSWORD";

pub async fn execute(app: &mut App, command: Command) -> Result<()> {
    match command {
        Command::Login { email } => {
            let email = match email.or_else(|| app.config.last_email.clone()) {
                Some(email) => email,
                None => prompt("Email: ")?,
            };
            let password = password()?;
            app.login(&email, &password).await?;
            print_whoami(app);
        }
        Command::Register { name, email } => {
            let password = password()?;
            let response = app.register(&name, &email, &password).await?;
            println!(
                "{}",
                response.message.as_deref().unwrap_or("Account created")
            );
            if app.session.is_authenticated() {
                print_whoami(app);
            } else {
                println!("Run `taskpad login` to start a session.");
            }
        }
        Command::Logout => {
            app.logout();
            println!("Logged out");
        }
        Command::Whoami => print_whoami(app),
        Command::Check => {
            let message = app.check().await?;
            println!("Session accepted by server: {}", message);
        }
        Command::List { pending } => {
            let (tasks, stats) = app.list().await?;
            let shown: Vec<&Task> = tasks.iter().filter(|t| !pending || !t.is_done()).collect();
            print_tasks(&shown);
            if let Some(stats) = stats {
                print_stats(&stats);
            }
        }
        Command::Show { id } => {
            let task = app.show(&id).await?;
            print_task_detail(&task);
        }
        Command::Add {
            title,
            description,
            priority,
            due,
            tags,
        } => {
            if title.trim().is_empty() {
                bail!("Title must not be empty");
            }
            let task = app
                .add(&TaskCreate {
                    title,
                    description,
                    priority,
                    due_date: due,
                    tags,
                    ..Default::default()
                })
                .await?;
            println!("Created {}", task.id);
        }
        Command::Update {
            id,
            title,
            description,
            priority,
            status,
            due,
            tags,
            replace,
        } => {
            let update = TaskUpdate {
                title,
                description,
                priority,
                status,
                due_date: due,
                tags: (!tags.is_empty()).then_some(tags),
                ..Default::default()
            };
            let task = app.update(&id, &update, replace).await?;
            print_task_detail(&task);
        }
        Command::Done { id } => {
            let task = app.set_done(&id, true).await?;
            println!("{}", task);
        }
        Command::Reopen { id } => {
            let task = app.set_done(&id, false).await?;
            println!("{}", task);
        }
        Command::Delete { id } => {
            app.delete(&id).await?;
            println!("Deleted {}", id);
        }
        Command::Stats => {
            let stats = app.stats().await?;
            print_stats(&stats);
        }
        Command::Users => {
            let users = app.users().await?;
            if users.is_empty() {
                println!("No users");
            }
            for user in &users {
                println!("{}", user_line(user));
            }
        }
        Command::User { action } => match action {
            UserAction::Show { id } => {
                let user = app.user(&id).await?;
                print_user_detail(&user);
            }
            UserAction::Update { id, name, email } => {
                let user = app.update_user(&id, &UserUpdate { name, email }).await?;
                print_user_detail(&user);
            }
            UserAction::Delete { id } => {
                app.delete_user(&id).await?;
                println!("Deleted user {}", id);
                if !app.session.is_authenticated() {
                    println!("Logged out");
                }
            }
        },
        Command::Shell => bail!("Already in the shell"),
    }
    Ok(())
}

fn prompt(label: &str) -> Result<String> {
    print!("{}", label);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin()
        .read_line(&mut line)
        .context("Failed to read input")?;
    let value = line.trim().to_string();
    if value.is_empty() {
        bail!("No input given");
    }
    Ok(value)
}

fn password() -> Result<String> {
    if let Ok(password) = std::env::var(ENV_PASSWORD) {
        if !password.is_empty() {
            return Ok(password);
        }
    }
    let password = rpassword::prompt_password("Password: ")?;
    if password.is_empty() {
        bail!("Password required");
    }
    Ok(password)
}

pub fn print_whoami(app: &App) {
    if !app.session.is_authenticated() {
        println!("Not logged in");
        return;
    }
    if let Some(user) = app.session.user() {
        if user.email.is_empty() {
            println!("Logged in as {}", user.display_name);
        } else {
            println!("Logged in as {} <{}>", user.display_name, user.email);
        }
    }
    match (app.session.expires_at(), app.session.time_remaining()) {
        (Some(at), Some(remaining)) => println!(
            "Session expires {} ({} left)",
            at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S"),
            format_remaining(remaining)
        ),
        _ => println!("Session does not expire"),
    }
}

pub fn task_line(task: &Task) -> String {
    format!(
        "{:<id_w$} {} {:<11} {:<7} {:<12} {}",
        truncate_string(&task.id, ID_WIDTH),
        if task.is_done() { "[x]" } else { "[ ]" },
        task.status_display(),
        task.priority.map(|p| p.display_name()).unwrap_or("-"),
        task.due_display(),
        truncate_string(&task.title, TITLE_WIDTH),
        id_w = ID_WIDTH,
    )
}

fn print_tasks(tasks: &[&Task]) {
    if tasks.is_empty() {
        println!("No tasks");
        return;
    }
    for task in tasks {
        println!("{}", task_line(task));
    }
}

fn print_task_detail(task: &Task) {
    println!("{}", task);
    println!("  id:       {}", task.id);
    println!("  status:   {}", task.status_display());
    if let Some(priority) = task.priority {
        println!("  priority: {}", priority.display_name());
    }
    if task.due_date.is_some() {
        println!("  due:      {}", task.due_display());
    }
    if !task.tags.is_empty() {
        println!("  tags:     {}", task.tags.join(", "));
    }
    if let Some(ref description) = task.description {
        println!();
        println!("  {}", description);
    }
}

pub fn user_line(user: &User) -> String {
    format!(
        "{:<id_w$} {:<24} {}",
        truncate_string(&user.id, ID_WIDTH),
        truncate_string(&user.name, 24),
        user.email,
        id_w = ID_WIDTH,
    )
}

fn print_user_detail(user: &User) {
    println!("{}", user.name);
    println!("  id:       {}", user.id);
    println!("  email:    {}", user.email);
    if let Some(ref created_at) = user.created_at {
        println!("  joined:   {}", format_date(created_at));
    }
}

fn print_stats(stats: &TaskStats) {
    println!(
        "{} tasks, {} completed, {} pending ({}% done)",
        stats.total,
        stats.completed,
        stats.pending,
        stats.percent_complete()
    );
}
