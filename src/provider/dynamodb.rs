//! DynamoDB-backed operation provider.
//!
//! `key` is the table's hash key attribute name. Each call picks a partition
//! value from [`KeyValues`]; writes put an item with synthetic `population`
//! and `cityCount` attributes, reads use strongly consistent `GetItem` so one
//! read costs a full read unit.

use std::error::Error as StdError;
use std::fmt::Debug;

use async_trait::async_trait;
use aws_sdk_dynamodb::config::Region;
use aws_sdk_dynamodb::error::{DisplayErrorContext, SdkError};
use aws_sdk_dynamodb::types::{AttributeValue, ReturnConsumedCapacity, ReturnValue};
use aws_sdk_dynamodb::Client;
use tracing::info;

use super::OperationProvider;
use crate::errors::OperationError;
use crate::payload::{random_attributes, KeyValues};

pub struct DynamoDbProvider {
    client: Client,
    table: String,
    key_values: KeyValues,
}

impl DynamoDbProvider {
    /// Builds an SDK client for `region`, optionally from a named credentials profile.
    pub async fn connect(
        region: &str,
        profile: Option<&str>,
        table: impl Into<String>,
        key_values: KeyValues,
    ) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(Region::new(region.to_string()));
        if let Some(profile) = profile {
            loader = loader.profile_name(profile);
        }
        let sdk_config = loader.load().await;
        let table = table.into();

        info!(
            region = region,
            table = %table,
            profile = profile.unwrap_or("default"),
            "DynamoDB client configured"
        );

        Self {
            client: Client::new(&sdk_config),
            table,
            key_values,
        }
    }
}

fn classify<E, R>(err: SdkError<E, R>, throttled: bool) -> OperationError
where
    E: StdError + 'static,
    R: Debug,
{
    let message = DisplayErrorContext(&err).to_string();
    if throttled {
        return OperationError::Throttled(message);
    }
    match err {
        SdkError::TimeoutError(_) => OperationError::Timeout(message),
        SdkError::DispatchFailure(_) => OperationError::Network(message),
        SdkError::ServiceError(_) => OperationError::Service(message),
        _ => OperationError::Other(message),
    }
}

#[async_trait]
impl OperationProvider for DynamoDbProvider {
    fn name(&self) -> &str {
        "dynamodb"
    }

    async fn write(&self, key: &str) -> Result<f64, OperationError> {
        let value = self.key_values.pick().to_string();
        let attrs = random_attributes();

        let resp = self
            .client
            .put_item()
            .table_name(&self.table)
            .item(key, AttributeValue::S(value.clone()))
            .item("population", AttributeValue::N(attrs.population.to_string()))
            .item("cityCount", AttributeValue::N(attrs.city_count.to_string()))
            .return_values(ReturnValue::None)
            .return_consumed_capacity(ReturnConsumedCapacity::Total)
            .send()
            .await
            .map_err(|e| {
                let throttled = e
                    .as_service_error()
                    .is_some_and(|se| se.is_provisioned_throughput_exceeded_exception());
                classify(e, throttled)
            })?;

        let units = resp
            .consumed_capacity()
            .and_then(|c| c.capacity_units())
            .unwrap_or_default();

        info!(
            value = %value,
            city_count = attrs.city_count,
            population = attrs.population,
            consumed_units = units,
            "Wrote item"
        );
        Ok(units)
    }

    async fn read(&self, key: &str) -> Result<f64, OperationError> {
        let value = self.key_values.pick().to_string();

        let resp = self
            .client
            .get_item()
            .table_name(&self.table)
            .key(key, AttributeValue::S(value.clone()))
            .consistent_read(true)
            .return_consumed_capacity(ReturnConsumedCapacity::Total)
            .send()
            .await
            .map_err(|e| {
                let throttled = e
                    .as_service_error()
                    .is_some_and(|se| se.is_provisioned_throughput_exceeded_exception());
                classify(e, throttled)
            })?;

        let attribute = |name: &str| {
            resp.item()
                .and_then(|item| item.get(name))
                .and_then(|v| v.as_n().ok())
                .cloned()
                .unwrap_or_else(|| "?".to_string())
        };
        let units = resp
            .consumed_capacity()
            .and_then(|c| c.capacity_units())
            .unwrap_or_default();

        info!(
            value = %value,
            city_count = %attribute("cityCount"),
            population = %attribute("population"),
            consumed_units = units,
            "Read item"
        );
        Ok(units)
    }

    async fn preflight(&self) -> Result<(), OperationError> {
        let resp = self
            .client
            .describe_table()
            .table_name(&self.table)
            .send()
            .await
            .map_err(|e| classify(e, false))?;

        let status = resp
            .table()
            .and_then(|t| t.table_status())
            .map(|s| s.as_str().to_string())
            .unwrap_or_else(|| "UNKNOWN".to_string());
        info!(table = %self.table, status = %status, "Target table reachable");
        Ok(())
    }
}
