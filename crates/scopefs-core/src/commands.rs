//! Command surface for an external dispatcher
//!
//! Each command takes a flat JSON argument record and answers with a flat
//! [`CommandResponse`]. Errors never escape: they become
//! `{error: true, message, kind}`.

use crate::error::{Error, ErrorKind};
use crate::sandbox::FileAccessService;
use crate::types::CommandResponse;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// Names accepted by [`CommandRouter::dispatch`]
pub const COMMANDS: &[&str] = &[
    "requestAccess",
    "list",
    "read",
    "write",
    "listGrants",
    "switchGrant",
    "removeGrant",
];

#[derive(Debug, Deserialize)]
struct ListArgs {
    #[serde(default)]
    directory: String,
}

#[derive(Debug, Deserialize)]
struct ReadArgs {
    path: String,
}

#[derive(Debug, Deserialize)]
struct WriteArgs {
    path: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct GrantArgs {
    id: String,
}

/// Routes named commands to a [`FileAccessService`]
#[derive(Clone)]
pub struct CommandRouter {
    service: Arc<FileAccessService>,
}

impl CommandRouter {
    pub fn new(service: Arc<FileAccessService>) -> Self {
        Self { service }
    }

    pub fn service(&self) -> &Arc<FileAccessService> {
        &self.service
    }

    /// Run `command` with `args`. Missing or null args count as `{}`.
    pub async fn dispatch(&self, command: &str, args: Value) -> CommandResponse {
        debug!("Dispatching command {}", command);
        let args = if args.is_null() {
            Value::Object(Default::default())
        } else {
            args
        };

        let response = match command {
            "requestAccess" => Ok(self.service.request_access().await),
            "list" => match parse::<ListArgs>(command, args) {
                Ok(args) => self.list(&args.directory).await,
                Err(response) => Ok(response),
            },
            "read" => match parse::<ReadArgs>(command, args) {
                Ok(args) => self.read(&args.path).await,
                Err(response) => Ok(response),
            },
            "write" => match parse::<WriteArgs>(command, args) {
                Ok(args) => self.write(&args.path, &args.content).await,
                Err(response) => Ok(response),
            },
            "listGrants" => self.list_grants().await,
            "switchGrant" => match parse::<GrantArgs>(command, args) {
                Ok(args) => Ok(self.service.switch_directory(&args.id).await),
                Err(response) => Ok(response),
            },
            "removeGrant" => match parse::<GrantArgs>(command, args) {
                Ok(args) => Ok(self.service.remove_directory(&args.id).await),
                Err(response) => Ok(response),
            },
            other => Ok(CommandResponse::failure(
                format!("Unknown command: {}", other),
                ErrorKind::Validation,
            )),
        };

        response.unwrap_or_else(|e| {
            warn!("Command {} failed: {}", command, e);
            CommandResponse::from_error(&e)
        })
    }

    async fn list(&self, directory: &str) -> Result<CommandResponse, Error> {
        let entries = self.service.list(directory).await?;
        Ok(CommandResponse::success(format!("Found {} entries", entries.len()))
            .with("directory", directory)
            .with("entries", entries))
    }

    async fn read(&self, path: &str) -> Result<CommandResponse, Error> {
        let file = self.service.read(path).await?;
        Ok(CommandResponse::success(format!("Read {} ({} bytes)", file.name, file.size))
            .with("path", path)
            .with_fields(file))
    }

    async fn write(&self, path: &str, content: &str) -> Result<CommandResponse, Error> {
        let outcome = self.service.write(path, content).await?;
        Ok(CommandResponse::success(format!(
            "Wrote {} bytes to {}",
            outcome.size, outcome.relative_path
        ))
        .with_fields(outcome))
    }

    async fn list_grants(&self) -> Result<CommandResponse, Error> {
        let grants = self.service.stored_directories().await?;
        let active = self.service.root_directory_name().await;
        Ok(CommandResponse::success(format!("{} stored directories", grants.len()))
            .with("activeDirectory", active)
            .with("grants", grants))
    }
}

fn parse<T: DeserializeOwned>(command: &str, args: Value) -> Result<T, CommandResponse> {
    serde_json::from_value(args).map_err(|e| {
        CommandResponse::failure(
            format!("Invalid arguments for {}: {}", command, e),
            ErrorKind::Validation,
        )
    })
}
