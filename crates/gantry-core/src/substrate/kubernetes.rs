// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Kubernetes-backed substrate.
//!
//! The only module in the tree that touches Kubernetes types. Project
//! provisioning is idempotent on resource names; pod and secret names are
//! deterministic functions of Event/Job IDs so repeated cleanup converges.

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{
    Container, EnvVar, EnvVarSource, Namespace, Pod, PodSpec, Secret as KubeSecret,
    SecretKeySelector, ServiceAccount as KubeServiceAccount,
};
use k8s_openapi::api::rbac::v1::{PolicyRule, Role as KubeRole, RoleBinding, RoleRef, Subject};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::Client;
use kube::api::{Api, DeleteParams, ListParams, LogParams, Patch, PatchParams, PostParams};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{info, instrument, warn};

use gantry_api::{
    ContainerSpec, Event, JobContainerSpec, JobSpec, KubernetesConfig, Project, REDACTED, Secret,
};

use crate::error::CoreError;

use super::names::{
    LABEL_COMPONENT, LABEL_EVENT, LABEL_PROJECT, PROJECT_REGISTRY, PROJECT_SECRETS,
    WORKER_SERVICE_ACCOUNT, job_pod, job_secret, namespace, project_namespace, worker_pod,
};
use super::{LogsSelector, SecretsStore, Substrate, WorkQueue};

/// Ceiling on any single substrate call.
const CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Environment variable carrying the Event ID into worker pods.
const ENV_EVENT_ID: &str = "GANTRY_EVENT_ID";
/// Environment variable carrying the per-event bearer token into worker pods.
const ENV_WORKER_TOKEN: &str = "GANTRY_WORKER_TOKEN";

fn already_exists(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(e) if e.code == 409)
}

fn is_gone(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(e) if e.code == 404)
}

/// Run a substrate call under the shared timeout. The outer error is the
/// timeout; the inner one is the API's own verdict, left intact so callers
/// can inspect status codes.
async fn bounded<T, F>(
    operation: &'static str,
    fut: F,
) -> Result<Result<T, kube::Error>, CoreError>
where
    F: std::future::Future<Output = Result<T, kube::Error>>,
{
    tokio::time::timeout(CALL_TIMEOUT, fut).await.map_err(|_| {
        CoreError::internal(format!("substrate {operation} timed out after {CALL_TIMEOUT:?}"))
    })
}

/// Create a resource, treating "already exists" as success. Provisioning
/// retries must converge on deterministic names.
async fn create_idempotent<K>(
    operation: &'static str,
    api: &Api<K>,
    resource: &K,
) -> Result<(), CoreError>
where
    K: kube::Resource + Clone + Debug + Serialize + DeserializeOwned,
{
    match bounded(operation, api.create(&PostParams::default(), resource)).await? {
        Ok(_) => Ok(()),
        Err(e) if already_exists(&e) => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn pod_labels(project: &Project, event: &Event, component: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (LABEL_COMPONENT.to_string(), component.to_string()),
        (LABEL_EVENT.to_string(), event.id.clone()),
        (LABEL_PROJECT.to_string(), project.id.clone()),
    ])
}

fn env_vars(environment: &BTreeMap<String, String>) -> Vec<EnvVar> {
    environment
        .iter()
        .map(|(name, value)| EnvVar {
            name: name.clone(),
            value: Some(value.clone()),
            value_from: None,
        })
        .collect()
}

/// Env vars that pull their values out of a job's environment secret.
fn secret_env_vars(
    secret_name: &str,
    container_name: &str,
    environment: &BTreeMap<String, String>,
) -> Vec<EnvVar> {
    environment
        .keys()
        .map(|name| EnvVar {
            name: name.clone(),
            value: None,
            value_from: Some(EnvVarSource {
                secret_key_ref: Some(SecretKeySelector {
                    name: Some(secret_name.to_string()),
                    key: format!("{container_name}.{name}"),
                    optional: None,
                }),
                ..Default::default()
            }),
        })
        .collect()
}

fn job_container(name: &str, spec: &JobContainerSpec, secret_name: &str) -> Container {
    Container {
        name: name.to_string(),
        image: Some(spec.image.clone()),
        command: (!spec.command.is_empty()).then(|| spec.command.clone()),
        args: (!spec.arguments.is_empty()).then(|| spec.arguments.clone()),
        working_dir: spec.working_directory.clone(),
        env: Some(secret_env_vars(secret_name, name, &spec.environment)),
        ..Default::default()
    }
}

fn worker_service_account(project: &Project) -> String {
    project
        .kubernetes
        .as_ref()
        .map(|k| k.worker_service_account.clone())
        .unwrap_or_else(|| WORKER_SERVICE_ACCOUNT.to_string())
}

/// Kubernetes-backed implementation of [`Substrate`].
pub struct KubernetesSubstrate {
    client: Client,
    queue: Arc<dyn WorkQueue>,
}

impl KubernetesSubstrate {
    pub fn new(client: Client, queue: Arc<dyn WorkQueue>) -> Self {
        Self { client, queue }
    }

    fn pods(&self, namespace: &str) -> Api<Pod> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn secrets(&self, namespace: &str) -> Api<KubeSecret> {
        Api::namespaced(self.client.clone(), namespace)
    }

    async fn count_running(&self, component: &str) -> Result<usize, CoreError> {
        let api: Api<Pod> = Api::all(self.client.clone());
        let params = ListParams::default()
            .labels(&format!("{LABEL_COMPONENT}={component}"))
            .fields("status.phase=Running");
        let pods = bounded("pod list", api.list(&params)).await??;
        Ok(pods.items.len())
    }
}

#[async_trait]
impl Substrate for KubernetesSubstrate {
    #[instrument(skip(self, project), fields(project_id = %project.id))]
    async fn create_project(&self, project: &Project) -> Result<KubernetesConfig, CoreError> {
        let ns_name = namespace(&project.id);

        let namespaces: Api<Namespace> = Api::all(self.client.clone());
        let ns = Namespace {
            metadata: ObjectMeta {
                name: Some(ns_name.clone()),
                labels: Some(BTreeMap::from([(
                    LABEL_PROJECT.to_string(),
                    project.id.clone(),
                )])),
                ..Default::default()
            },
            ..Default::default()
        };
        create_idempotent("namespace create", &namespaces, &ns).await?;

        let service_accounts: Api<KubeServiceAccount> =
            Api::namespaced(self.client.clone(), &ns_name);
        let sa = KubeServiceAccount {
            metadata: ObjectMeta {
                name: Some(WORKER_SERVICE_ACCOUNT.to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        create_idempotent("service account create", &service_accounts, &sa).await?;

        let roles: Api<KubeRole> = Api::namespaced(self.client.clone(), &ns_name);
        let role = KubeRole {
            metadata: ObjectMeta {
                name: Some(WORKER_SERVICE_ACCOUNT.to_string()),
                ..Default::default()
            },
            rules: Some(vec![PolicyRule {
                api_groups: Some(vec![String::new()]),
                resources: Some(vec!["secrets".to_string()]),
                verbs: ["get", "list", "watch"].iter().map(|v| v.to_string()).collect(),
                ..Default::default()
            }]),
        };
        create_idempotent("role create", &roles, &role).await?;

        let role_bindings: Api<RoleBinding> = Api::namespaced(self.client.clone(), &ns_name);
        let binding = RoleBinding {
            metadata: ObjectMeta {
                name: Some(WORKER_SERVICE_ACCOUNT.to_string()),
                ..Default::default()
            },
            role_ref: RoleRef {
                api_group: "rbac.authorization.k8s.io".to_string(),
                kind: "Role".to_string(),
                name: WORKER_SERVICE_ACCOUNT.to_string(),
            },
            subjects: Some(vec![Subject {
                kind: "ServiceAccount".to_string(),
                name: WORKER_SERVICE_ACCOUNT.to_string(),
                namespace: Some(ns_name.clone()),
                ..Default::default()
            }]),
        };
        create_idempotent("role binding create", &role_bindings, &binding).await?;

        let secrets = self.secrets(&ns_name);
        for name in [PROJECT_SECRETS, PROJECT_REGISTRY] {
            let secret = KubeSecret {
                metadata: ObjectMeta {
                    name: Some(name.to_string()),
                    labels: Some(BTreeMap::from([(
                        LABEL_PROJECT.to_string(),
                        project.id.clone(),
                    )])),
                    ..Default::default()
                },
                type_: Some("Opaque".to_string()),
                ..Default::default()
            };
            create_idempotent("secret create", &secrets, &secret).await?;
        }

        info!(namespace = %ns_name, "Project provisioned");

        Ok(KubernetesConfig {
            namespace: ns_name,
            worker_service_account: WORKER_SERVICE_ACCOUNT.to_string(),
            secrets: vec![PROJECT_SECRETS.to_string(), PROJECT_REGISTRY.to_string()],
        })
    }

    #[instrument(skip(self, project), fields(project_id = %project.id))]
    async fn delete_project(&self, project: &Project) -> Result<(), CoreError> {
        let ns_name = project_namespace(project);
        let namespaces: Api<Namespace> = Api::all(self.client.clone());
        match bounded("namespace delete", namespaces.delete(&ns_name, &DeleteParams::default()))
            .await?
        {
            Ok(_) => Ok(()),
            Err(e) if is_gone(&e) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn schedule_worker(&self, event: &Event) -> Result<(), CoreError> {
        self.queue.enqueue_worker(event).await
    }

    async fn unschedule_worker(&self, event: &Event) -> Result<(), CoreError> {
        self.queue.remove_worker(&event.id).await
    }

    #[instrument(skip(self, project, event, token), fields(event_id = %event.id))]
    async fn start_worker(
        &self,
        project: &Project,
        event: &Event,
        token: &str,
    ) -> Result<(), CoreError> {
        let container_spec: &ContainerSpec =
            event.worker.spec.container.as_ref().ok_or_else(|| {
                CoreError::internal(format!("event {} has no worker container", event.id))
            })?;

        let mut env = vec![
            EnvVar {
                name: ENV_EVENT_ID.to_string(),
                value: Some(event.id.clone()),
                value_from: None,
            },
            EnvVar {
                name: ENV_WORKER_TOKEN.to_string(),
                value: Some(token.to_string()),
                value_from: None,
            },
        ];
        env.extend(env_vars(&container_spec.environment));

        let ns_name = project_namespace(project);
        let pod = Pod {
            metadata: ObjectMeta {
                name: Some(worker_pod(&event.id)),
                labels: Some(pod_labels(project, event, "worker")),
                ..Default::default()
            },
            spec: Some(PodSpec {
                service_account_name: Some(worker_service_account(project)),
                restart_policy: Some("Never".to_string()),
                containers: vec![Container {
                    name: "worker".to_string(),
                    image: Some(container_spec.image.clone()),
                    command: (!container_spec.command.is_empty())
                        .then(|| container_spec.command.clone()),
                    args: (!container_spec.arguments.is_empty())
                        .then(|| container_spec.arguments.clone()),
                    env: Some(env),
                    ..Default::default()
                }],
                ..Default::default()
            }),
            ..Default::default()
        };

        create_idempotent("worker pod create", &self.pods(&ns_name), &pod).await?;
        info!(pod = %worker_pod(&event.id), "Worker pod created");
        Ok(())
    }

    #[instrument(skip(self, project, event, spec), fields(event_id = %event.id, job = %job_name))]
    async fn store_job_environment(
        &self,
        project: &Project,
        event: &Event,
        job_name: &str,
        spec: &JobSpec,
    ) -> Result<Vec<String>, CoreError> {
        let secret_name = job_secret(&event.id, job_name);
        let mut string_data = BTreeMap::new();
        for (key, value) in &spec.primary_container.environment {
            string_data.insert(format!("{job_name}.{key}"), value.clone());
        }
        for (sidecar_name, sidecar) in &spec.sidecar_containers {
            for (key, value) in &sidecar.environment {
                string_data.insert(format!("{sidecar_name}.{key}"), value.clone());
            }
        }

        let ns_name = project_namespace(project);
        let secret = KubeSecret {
            metadata: ObjectMeta {
                name: Some(secret_name.clone()),
                labels: Some(pod_labels(project, event, "job")),
                ..Default::default()
            },
            type_: Some("Opaque".to_string()),
            string_data: (!string_data.is_empty()).then_some(string_data),
            ..Default::default()
        };
        create_idempotent("job secret create", &self.secrets(&ns_name), &secret).await?;

        Ok(vec![secret_name])
    }

    async fn schedule_job(&self, event: &Event, job_name: &str) -> Result<(), CoreError> {
        self.queue.enqueue_job(event, job_name).await
    }

    #[instrument(skip(self, project, event), fields(event_id = %event.id, job = %job_name))]
    async fn start_job(
        &self,
        project: &Project,
        event: &Event,
        job_name: &str,
    ) -> Result<(), CoreError> {
        let job = event
            .worker
            .jobs
            .get(job_name)
            .ok_or_else(|| CoreError::not_found("Job", job_name))?;

        let secret_name = job_secret(&event.id, job_name);
        let mut containers =
            vec![job_container(job_name, &job.spec.primary_container, &secret_name)];
        for (sidecar_name, sidecar) in &job.spec.sidecar_containers {
            containers.push(job_container(sidecar_name, sidecar, &secret_name));
        }

        let ns_name = project_namespace(project);
        let pod = Pod {
            metadata: ObjectMeta {
                name: Some(job_pod(&event.id, job_name)),
                labels: Some(pod_labels(project, event, "job")),
                ..Default::default()
            },
            spec: Some(PodSpec {
                service_account_name: Some(worker_service_account(project)),
                restart_policy: Some("Never".to_string()),
                containers,
                ..Default::default()
            }),
            ..Default::default()
        };

        create_idempotent("job pod create", &self.pods(&ns_name), &pod).await?;
        info!(pod = %job_pod(&event.id, job_name), "Job pod created");
        Ok(())
    }

    async fn count_running_workers(&self) -> Result<usize, CoreError> {
        self.count_running("worker").await
    }

    async fn count_running_jobs(&self) -> Result<usize, CoreError> {
        self.count_running("job").await
    }

    #[instrument(skip(self, project, event), fields(event_id = %event.id))]
    async fn delete_worker_and_jobs(
        &self,
        project: &Project,
        event: &Event,
    ) -> Result<(), CoreError> {
        let ns_name = project_namespace(project);
        let selector = ListParams::default().labels(&format!("{LABEL_EVENT}={}", event.id));

        match bounded(
            "pod delete",
            self.pods(&ns_name)
                .delete_collection(&DeleteParams::default(), &selector),
        )
        .await?
        {
            Ok(_) => {}
            Err(e) if is_gone(&e) => {}
            Err(e) => return Err(e.into()),
        }

        match bounded(
            "secret delete",
            self.secrets(&ns_name)
                .delete_collection(&DeleteParams::default(), &selector),
        )
        .await?
        {
            Ok(_) => {}
            Err(e) if is_gone(&e) => {}
            Err(e) => return Err(e.into()),
        }

        Ok(())
    }

    async fn get_logs(
        &self,
        project: &Project,
        event: &Event,
        selector: &LogsSelector,
    ) -> Result<String, CoreError> {
        let ns_name = project_namespace(project);
        let pod_name = match &selector.job {
            Some(job_name) => job_pod(&event.id, job_name),
            None => worker_pod(&event.id),
        };
        let params = LogParams {
            container: selector.container.clone(),
            ..Default::default()
        };
        match bounded("log fetch", self.pods(&ns_name).logs(&pod_name, &params)).await? {
            Ok(logs) => Ok(logs),
            Err(e) if is_gone(&e) => {
                warn!(pod = %pod_name, "Log fetch for absent pod");
                Err(CoreError::not_found("Pod", pod_name))
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Kubernetes-backed implementation of [`SecretsStore`] over the Project's
/// well-known `project-secrets` object.
pub struct KubernetesSecretsStore {
    client: Client,
}

impl KubernetesSecretsStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, project: &Project) -> Api<KubeSecret> {
        Api::namespaced(self.client.clone(), &project_namespace(project))
    }
}

#[async_trait]
impl SecretsStore for KubernetesSecretsStore {
    async fn list(&self, project: &Project) -> Result<Vec<Secret>, CoreError> {
        let secret = match bounded("secret get", self.api(project).get(PROJECT_SECRETS)).await? {
            Ok(secret) => secret,
            Err(e) if is_gone(&e) => {
                return Err(CoreError::not_found("Project", &project.id));
            }
            Err(e) => return Err(e.into()),
        };

        let mut items: Vec<Secret> = secret
            .data
            .unwrap_or_default()
            .into_keys()
            .map(|key| Secret {
                key,
                value: REDACTED.to_string(),
            })
            .collect();
        items.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(items)
    }

    async fn set(&self, project: &Project, secret: Secret) -> Result<(), CoreError> {
        let mut entries = serde_json::Map::new();
        entries.insert(secret.key, serde_json::Value::String(secret.value));
        let patch = json!({ "stringData": entries });
        bounded(
            "secret patch",
            self.api(project).patch(
                PROJECT_SECRETS,
                &PatchParams::default(),
                &Patch::Merge(&patch),
            ),
        )
        .await??;
        Ok(())
    }

    async fn unset(&self, project: &Project, key: &str) -> Result<(), CoreError> {
        // A merge patch with an explicit null removes the key.
        let mut entries = serde_json::Map::new();
        entries.insert(key.to_string(), serde_json::Value::Null);
        let patch = json!({ "data": entries });
        bounded(
            "secret patch",
            self.api(project).patch(
                PROJECT_SECRETS,
                &PatchParams::default(),
                &Patch::Merge(&patch),
            ),
        )
        .await??;
        Ok(())
    }
}
