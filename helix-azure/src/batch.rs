//! Batch service client
//!
//! Job and task creation against the batch REST API. Job and task shapes are
//! constructed as data ([`JobSpec`], [`TaskSpec`]); the task command in
//! particular is an argument vector, rendered to a command line with proper
//! quoting in exactly one place ([`render_command_line`]) rather than built
//! by string interpolation at call sites.

use std::sync::Arc;

use serde::Serialize;

use crate::auth::TokenCredential;
use crate::error::{Result, check_status};

const BATCH_RESOURCE: &str = "https://batch.core.windows.net/";
const API_VERSION: &str = "2023-11-01.18.0";

/// A batch job to be created.
#[derive(Debug, Clone)]
pub struct JobSpec {
    pub id: String,
    pub display_name: String,
    pub pool_id: String,
    /// When true the job terminates itself once its tasks complete, so no
    /// job objects linger after the run.
    pub terminate_on_all_tasks_complete: bool,
}

/// A batch task to be added to a job.
#[derive(Debug, Clone)]
pub struct TaskSpec {
    pub id: String,
    /// Program + arguments; never a pre-joined shell string.
    pub command: Vec<String>,
    pub container: ContainerSpec,
    pub identity: UserIdentitySpec,
    pub environment: Vec<(String, String)>,
    pub resource_files: Vec<ResourceFileSpec>,
}

#[derive(Debug, Clone)]
pub struct ContainerSpec {
    pub image_name: String,
    pub registry_server: String,
    /// Managed identity used to pull from the registry.
    pub identity_resource_id: String,
}

/// Auto-user identity the task runs under.
#[derive(Debug, Clone)]
pub struct UserIdentitySpec {
    pub elevation_level: ElevationLevel,
    pub scope: AutoUserScope,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElevationLevel {
    NonAdmin,
    Admin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoUserScope {
    Task,
    Pool,
}

#[derive(Debug, Clone)]
pub struct ResourceFileSpec {
    /// Auto-storage container whose contents are staged into the task
    /// working directory.
    pub auto_storage_container_name: String,
}

/// Renders an argument vector as a single shell command line.
///
/// Each argument is single-quoted with embedded quotes escaped, which is the
/// only quoting rule POSIX shells need.
pub fn render_command_line(argv: &[String]) -> String {
    argv.iter()
        .map(|arg| {
            if !arg.is_empty()
                && arg
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || "-_./:=@".contains(c))
            {
                arg.clone()
            } else {
                format!("'{}'", arg.replace('\'', r"'\''"))
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

// Wire shapes for the REST API.

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct JobBody<'a> {
    id: &'a str,
    display_name: &'a str,
    pool_info: PoolInfoBody<'a>,
    on_all_tasks_complete: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PoolInfoBody<'a> {
    pool_id: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TaskBody<'a> {
    id: &'a str,
    command_line: String,
    container_settings: ContainerSettingsBody<'a>,
    user_identity: UserIdentityBody,
    environment_settings: Vec<EnvSettingBody<'a>>,
    resource_files: Vec<ResourceFileBody<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ContainerSettingsBody<'a> {
    image_name: &'a str,
    registry: RegistryBody<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RegistryBody<'a> {
    registry_server: &'a str,
    identity_reference: IdentityReferenceBody<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct IdentityReferenceBody<'a> {
    resource_id: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UserIdentityBody {
    auto_user: AutoUserBody,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AutoUserBody {
    elevation_level: &'static str,
    scope: &'static str,
}

#[derive(Serialize)]
struct EnvSettingBody<'a> {
    name: &'a str,
    value: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ResourceFileBody<'a> {
    auto_storage_container_name: &'a str,
}

/// Client scoped to one batch account.
pub struct BatchClient {
    client: reqwest::Client,
    base_url: String,
    credential: Arc<dyn TokenCredential>,
}

impl BatchClient {
    /// # Arguments
    /// * `account_url` - batch account URL
    ///   (e.g. "https://myaccount.westus2.batch.azure.com")
    pub fn new(account_url: impl Into<String>, credential: Arc<dyn TokenCredential>) -> Self {
        let account_url = account_url.into();
        Self {
            client: reqwest::Client::new(),
            base_url: account_url.trim_end_matches('/').to_string(),
            credential,
        }
    }

    /// Creates a job.
    pub async fn add_job(&self, job: &JobSpec) -> Result<()> {
        let token = self.credential.token(BATCH_RESOURCE).await?;
        let url = format!("{}/jobs", self.base_url);

        let body = JobBody {
            id: &job.id,
            display_name: &job.display_name,
            pool_info: PoolInfoBody {
                pool_id: &job.pool_id,
            },
            on_all_tasks_complete: if job.terminate_on_all_tasks_complete {
                "terminatejob"
            } else {
                "noaction"
            },
        };

        let response = self
            .client
            .post(&url)
            .query(&[("api-version", API_VERSION)])
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?;

        check_status(response).await?;
        Ok(())
    }

    /// Adds a task to an existing job.
    pub async fn add_task(&self, job_id: &str, task: &TaskSpec) -> Result<()> {
        let token = self.credential.token(BATCH_RESOURCE).await?;
        let url = format!("{}/jobs/{}/tasks", self.base_url, job_id);

        let body = TaskBody {
            id: &task.id,
            command_line: render_command_line(&task.command),
            container_settings: ContainerSettingsBody {
                image_name: &task.container.image_name,
                registry: RegistryBody {
                    registry_server: &task.container.registry_server,
                    identity_reference: IdentityReferenceBody {
                        resource_id: &task.container.identity_resource_id,
                    },
                },
            },
            user_identity: UserIdentityBody {
                auto_user: AutoUserBody {
                    elevation_level: match task.identity.elevation_level {
                        ElevationLevel::NonAdmin => "nonadmin",
                        ElevationLevel::Admin => "admin",
                    },
                    scope: match task.identity.scope {
                        AutoUserScope::Task => "task",
                        AutoUserScope::Pool => "pool",
                    },
                },
            },
            environment_settings: task
                .environment
                .iter()
                .map(|(name, value)| EnvSettingBody { name, value })
                .collect(),
            resource_files: task
                .resource_files
                .iter()
                .map(|r| ResourceFileBody {
                    auto_storage_container_name: &r.auto_storage_container_name,
                })
                .collect(),
        };

        let response = self
            .client
            .post(&url)
            .query(&[("api-version", API_VERSION)])
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?;

        check_status(response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_plain_arguments_not_quoted() {
        assert_eq!(
            render_command_line(&argv(&["/bin/bash", "-c", "run.sh"])),
            "/bin/bash -c run.sh"
        );
    }

    #[test]
    fn test_arguments_with_spaces_quoted() {
        assert_eq!(
            render_command_line(&argv(&["echo", "hello world"])),
            "echo 'hello world'"
        );
    }

    #[test]
    fn test_embedded_single_quote_escaped() {
        assert_eq!(
            render_command_line(&argv(&["echo", "it's"])),
            r"echo 'it'\''s'"
        );
    }

    #[test]
    fn test_shell_metacharacters_neutralized() {
        // A value smuggled out of a secret store must not break out of its
        // argument position.
        let rendered = render_command_line(&argv(&["secrets", "set", "key", "x && rm -rf /"]));
        assert_eq!(rendered, "secrets set key 'x && rm -rf /'");
    }

    #[test]
    fn test_empty_argument_quoted() {
        assert_eq!(render_command_line(&argv(&["prog", ""])), "prog ''");
    }
}
