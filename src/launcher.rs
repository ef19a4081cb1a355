//! Run trigger: turns a launch request into a fire-and-forget container run.
//!
//! The request names the table and per-direction capacities; the plan maps
//! them onto the container variables the stress binary reads at start-up.

use async_trait::async_trait;
use aws_sdk_ecs::config::Region;
use aws_sdk_ecs::error::DisplayErrorContext;
use aws_sdk_ecs::types::{
    AssignPublicIp, AwsVpcConfiguration, ContainerOverride, KeyValuePair, LaunchType,
    NetworkConfiguration, TaskOverride,
};
use aws_sdk_ecs::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info};

use crate::config::{READ_STRESS_CONFIG, WRITE_STRESS_CONFIG};
use crate::errors::{ConfigurationError, LaunchError};

/// Fields every launch request must carry.
pub const REQUIRED_FIELDS: &[&str] = &["tableRegion", "tableName", "hashKey", "duration"];

/// Parameters of one remote run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchRequest {
    pub table_region: Option<String>,
    pub table_name: Option<String>,
    pub hash_key: Option<String>,
    pub duration: Option<u64>,
    pub rcu: Option<i64>,
    pub wcu: Option<i64>,
}

/// Container environment for one run, in a stable order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchPlan {
    pub environment: Vec<(String, String)>,
}

impl LaunchPlan {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.environment
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

impl LaunchRequest {
    /// Parses a JSON event, reporting the first missing required field.
    pub fn from_json(event: &Value) -> Result<Self, ConfigurationError> {
        for field in REQUIRED_FIELDS {
            if event.get(*field).map_or(true, Value::is_null) {
                return Err(ConfigurationError::MissingField {
                    field: field.to_string(),
                });
            }
        }
        serde_json::from_value(event.clone()).map_err(|e| ConfigurationError::InvalidField {
            field: "event".to_string(),
            message: e.to_string(),
        })
    }

    pub fn plan(&self) -> Result<LaunchPlan, ConfigurationError> {
        fn required<'a, T>(value: &'a Option<T>, field: &str) -> Result<&'a T, ConfigurationError> {
            value.as_ref().ok_or_else(|| ConfigurationError::MissingField {
                field: field.to_string(),
            })
        }

        let table_region = required(&self.table_region, "tableRegion")?;
        let table_name = required(&self.table_name, "tableName")?;
        let hash_key = required(&self.hash_key, "hashKey")?;
        let duration = required(&self.duration, "duration")?;

        let read_stress_config = match self.rcu {
            Some(rcu) if rcu > 0 => format!("-sr -rcu {}", rcu),
            _ => String::new(),
        };
        let write_stress_config = match self.wcu {
            Some(wcu) if wcu > 0 => format!("-sw -wcu {}", wcu),
            _ => String::new(),
        };
        if read_stress_config.is_empty() && write_stress_config.is_empty() {
            return Err(ConfigurationError::NoDirection);
        }

        Ok(LaunchPlan {
            environment: vec![
                (WRITE_STRESS_CONFIG.to_string(), write_stress_config),
                (READ_STRESS_CONFIG.to_string(), read_stress_config),
                ("TABLE_REGION".to_string(), table_region.clone()),
                ("TABLE_NAME".to_string(), table_name.clone()),
                ("HASH_KEY".to_string(), hash_key.clone()),
                ("DURATION".to_string(), duration.to_string()),
            ],
        })
    }
}

/// Starts a remote run without waiting for it to finish.
#[async_trait]
pub trait TaskLauncher: Send + Sync {
    /// Returns an identifier of the started run.
    async fn launch(&self, plan: &LaunchPlan) -> Result<String, LaunchError>;
}

/// Where and how the ECS task runs.
#[derive(Debug, Clone)]
pub struct EcsTarget {
    pub cluster: String,
    pub task_definition: String,
    pub container_name: String,
    pub subnets: Vec<String>,
    pub security_groups: Vec<String>,
}

/// Launches the stress container as a Fargate task.
pub struct EcsLauncher {
    client: Client,
    target: EcsTarget,
}

impl EcsLauncher {
    pub async fn connect(region: Option<&str>, target: EcsTarget) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(region) = region {
            loader = loader.region(Region::new(region.to_string()));
        }
        let sdk_config = loader.load().await;
        Self {
            client: Client::new(&sdk_config),
            target,
        }
    }
}

#[async_trait]
impl TaskLauncher for EcsLauncher {
    async fn launch(&self, plan: &LaunchPlan) -> Result<String, LaunchError> {
        let environment = plan
            .environment
            .iter()
            .map(|(name, value)| KeyValuePair::builder().name(name).value(value).build())
            .collect::<Vec<_>>();

        let overrides = TaskOverride::builder()
            .container_overrides(
                ContainerOverride::builder()
                    .name(&self.target.container_name)
                    .set_environment(Some(environment))
                    .build(),
            )
            .build();

        let vpc = AwsVpcConfiguration::builder()
            .set_subnets(Some(self.target.subnets.clone()))
            .set_security_groups(Some(self.target.security_groups.clone()))
            .assign_public_ip(AssignPublicIp::Enabled)
            .build()
            .map_err(|e| LaunchError::Request(e.to_string()))?;

        let resp = self
            .client
            .run_task()
            .cluster(&self.target.cluster)
            .task_definition(&self.target.task_definition)
            .overrides(overrides)
            .launch_type(LaunchType::Fargate)
            .platform_version("LATEST")
            .network_configuration(
                NetworkConfiguration::builder()
                    .awsvpc_configuration(vpc)
                    .build(),
            )
            .send()
            .await
            .map_err(|e| LaunchError::Request(DisplayErrorContext(&e).to_string()))?;

        if let Some(failure) = resp.failures().first() {
            return Err(LaunchError::Rejected(
                failure.reason().unwrap_or("unknown reason").to_string(),
            ));
        }

        let task_arn = resp
            .tasks()
            .first()
            .and_then(|task| task.task_arn())
            .unwrap_or_default()
            .to_string();
        info!(task_arn = %task_arn, cluster = %self.target.cluster, "Stress task started");
        Ok(task_arn)
    }
}

/// Outcome reported to whoever triggered the launch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchResponse {
    pub success: bool,
    pub error: Option<String>,
}

impl LaunchResponse {
    fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    fn failed(error: impl ToString) -> Self {
        Self {
            success: false,
            error: Some(error.to_string()),
        }
    }
}

/// Validates `event` and starts one run for it.
pub async fn dispatch(event: &Value, launcher: &dyn TaskLauncher) -> LaunchResponse {
    info!(event = %event, "Received launch event");

    let plan = match LaunchRequest::from_json(event).and_then(|request| request.plan()) {
        Ok(plan) => plan,
        Err(e) => {
            error!(error = %e, "Rejected launch event");
            return LaunchResponse::failed(e);
        }
    };

    match launcher.launch(&plan).await {
        Ok(_) => LaunchResponse::ok(),
        Err(e) => {
            error!(error = %e, "Launch failed");
            LaunchResponse::failed(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_plan_both_directions() {
        let request = LaunchRequest::from_json(&json!({
            "wcu": 5,
            "rcu": 10,
            "tableRegion": "us-east-1",
            "tableName": "MyTable2",
            "hashKey": "MyKey",
            "duration": 420
        }))
        .unwrap();

        let plan = request.plan().unwrap();
        assert_eq!(plan.get(WRITE_STRESS_CONFIG), Some("-sw -wcu 5"));
        assert_eq!(plan.get(READ_STRESS_CONFIG), Some("-sr -rcu 10"));
        assert_eq!(plan.get("TABLE_REGION"), Some("us-east-1"));
        assert_eq!(plan.get("DURATION"), Some("420"));
        assert_eq!(plan.environment.len(), 6);
    }

    #[test]
    fn test_disabled_direction_is_empty() {
        let request = LaunchRequest::from_json(&json!({
            "rcu": 0,
            "wcu": 3,
            "tableRegion": "eu-west-1",
            "tableName": "t",
            "hashKey": "k",
            "duration": 60
        }))
        .unwrap();

        let plan = request.plan().unwrap();
        assert_eq!(plan.get(READ_STRESS_CONFIG), Some(""));
        assert_eq!(plan.get(WRITE_STRESS_CONFIG), Some("-sw -wcu 3"));
    }

    #[test]
    fn test_missing_field() {
        let err = LaunchRequest::from_json(&json!({
            "tableRegion": "eu-west-1",
            "tableName": "t",
            "duration": 60,
            "rcu": 5
        }))
        .unwrap_err();
        assert_eq!(
            err,
            ConfigurationError::MissingField {
                field: "hashKey".to_string()
            }
        );
    }

    #[test]
    fn test_no_direction() {
        let request = LaunchRequest::from_json(&json!({
            "tableRegion": "eu-west-1",
            "tableName": "t",
            "hashKey": "k",
            "duration": 60
        }))
        .unwrap();
        assert_eq!(request.plan().unwrap_err(), ConfigurationError::NoDirection);
    }

    #[test]
    fn test_wrong_type_is_invalid_field() {
        let err = LaunchRequest::from_json(&json!({
            "tableRegion": "eu-west-1",
            "tableName": "t",
            "hashKey": "k",
            "duration": "soon",
            "rcu": 5
        }))
        .unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidField { .. }));
    }
}
