//! Commands read from stdin while running.

use dropmate_lifecycle::AppState;

pub const HELP: &str = "commands: foreground | background | inactive | status | list | \
deliver <shipment-id> | notice <shipment-id> | help | quit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostCommand {
    /// Report an OS app state.
    SetState(AppState),
    Status,
    List,
    /// Push a delivered status over the offline channel.
    Deliver(String),
    /// Handle a push notification for a shipment.
    Notice(String),
    Help,
    Quit,
}

impl HostCommand {
    pub fn parse(line: &str) -> Result<Self, String> {
        let mut words = line.split_whitespace();
        let command = words.next().unwrap_or_default().to_ascii_lowercase();
        let argument = words.next().map(str::to_string);

        let with_id = |build: fn(String) -> HostCommand| {
            argument
                .clone()
                .map(build)
                .ok_or_else(|| format!("{command} needs a shipment id"))
        };

        match command.as_str() {
            "foreground" | "active" => Ok(HostCommand::SetState(AppState::Active)),
            "background" => Ok(HostCommand::SetState(AppState::Background)),
            "inactive" => Ok(HostCommand::SetState(AppState::Inactive)),
            "status" => Ok(HostCommand::Status),
            "list" => Ok(HostCommand::List),
            "deliver" => with_id(HostCommand::Deliver),
            "notice" => with_id(HostCommand::Notice),
            "help" | "?" => Ok(HostCommand::Help),
            "quit" | "exit" => Ok(HostCommand::Quit),
            other => Err(format!("unknown command '{other}'; {HELP}")),
        }
    }
}
