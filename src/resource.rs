//! The managed-resource contract the provider dispatches to.
//!
//! The host drives every resource through the same sequence: the provider
//! instantiates it from a [`ResourceFactory`], hands it the shared
//! [`ProviderData`] published at Configure time, then invokes exactly one
//! lifecycle operation on it.

use std::any::Any;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::ProviderError;
use crate::schema::Schema;
use crate::types::{AttributeChange, PlanResult};
use crate::validation;

/// Read-only handle the provider shares with every resource instance.
///
/// The concrete type is only known to the provider that published it;
/// resources downcast it in [`Resource::configure`].
pub type ProviderData = Arc<dyn Any + Send + Sync>;

/// Builds a fresh, unconfigured resource instance.
pub type ResourceFactory = fn() -> Box<dyn Resource>;

/// A managed resource type.
#[async_trait::async_trait]
pub trait Resource: Send + Sync {
    /// Full resource type name, derived from the provider's type name.
    fn type_name(&self, provider_type_name: &str) -> String;

    /// Per-instance schema.
    fn schema(&self) -> Schema;

    /// Capture the provider handle. `None` means the provider has not been
    /// configured yet; implementations should accept that silently.
    fn configure(&mut self, provider_data: Option<ProviderData>) -> Result<(), ProviderError>;

    /// Plan a create (`prior_state` is `None`) or an update.
    ///
    /// The default plan takes the proposed values as-is and carries
    /// computed attributes over from the prior state, leaving them null
    /// (unknown until apply) on create.
    async fn plan(
        &self,
        prior_state: Option<Value>,
        proposed_state: Value,
    ) -> Result<PlanResult, ProviderError> {
        let schema = self.schema();
        let mut map = match proposed_state {
            Value::Object(map) => map,
            other => {
                return Err(ProviderError::Validation(validation::validate(
                    &schema, &other,
                )))
            },
        };

        for (name, attr) in &schema.block.attributes {
            if attr.flags.computed && !attr.flags.optional && !attr.flags.required {
                let carried = prior_state
                    .as_ref()
                    .and_then(|prior| prior.get(name))
                    .cloned()
                    .unwrap_or(Value::Null);
                map.insert(name.clone(), carried);
            }
        }

        if prior_state.is_some() {
            return Ok(PlanResult::no_change(Value::Object(map)));
        }

        let changes = map
            .iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(k, v)| AttributeChange::added(k.clone(), v.clone()))
            .collect();
        let planned = Value::Object(map);
        Ok(PlanResult::with_changes(planned, changes, false))
    }

    /// Create the resource and return the state the host should persist.
    async fn create(&self, planned_state: Value) -> Result<Value, ProviderError>;

    /// Refresh the resource state.
    async fn read(&self, current_state: Value) -> Result<Value, ProviderError>;

    /// Apply planned changes to an existing resource.
    async fn update(&self, prior_state: Value, planned_state: Value)
        -> Result<Value, ProviderError>;

    /// Destroy the resource.
    async fn delete(&self, current_state: Value) -> Result<(), ProviderError>;
}

/// Decode host-supplied values into a typed record.
///
/// Values are first checked against `schema`; any error diagnostics are
/// returned as [`ProviderError::Validation`] before serde gets a look.
pub fn decode<T: DeserializeOwned>(schema: &Schema, value: Value) -> Result<T, ProviderError> {
    validation::validate_result(schema, &value).map_err(ProviderError::Validation)?;
    Ok(serde_json::from_value(value)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Attribute;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize)]
    struct Named {
        name: String,
    }

    struct Echo;

    #[async_trait::async_trait]
    impl Resource for Echo {
        fn type_name(&self, provider_type_name: &str) -> String {
            format!("{}_echo", provider_type_name)
        }

        fn schema(&self) -> Schema {
            Schema::v0()
                .with_attribute("name", Attribute::required_string())
                .with_attribute("id", Attribute::computed_string())
        }

        fn configure(&mut self, _provider_data: Option<ProviderData>) -> Result<(), ProviderError> {
            Ok(())
        }

        async fn create(&self, planned_state: Value) -> Result<Value, ProviderError> {
            Ok(planned_state)
        }

        async fn read(&self, current_state: Value) -> Result<Value, ProviderError> {
            Ok(current_state)
        }

        async fn update(
            &self,
            _prior_state: Value,
            planned_state: Value,
        ) -> Result<Value, ProviderError> {
            Ok(planned_state)
        }

        async fn delete(&self, _current_state: Value) -> Result<(), ProviderError> {
            Ok(())
        }
    }

    #[test]
    fn test_decode() {
        let schema = Echo.schema();
        let named: Named = decode(&schema, json!({"name": "a"})).unwrap();
        assert_eq!(named.name, "a");

        let err = decode::<Named>(&schema, json!({"name": 1})).unwrap_err();
        assert!(matches!(err, ProviderError::Validation(ref d) if d.len() == 1));
    }

    #[tokio::test]
    async fn test_default_plan_create_leaves_computed_unknown() {
        let plan = Echo.plan(None, json!({"name": "a"})).await.unwrap();

        assert_eq!(plan.planned_state, json!({"name": "a", "id": null}));
        assert_eq!(plan.changes.len(), 1);
        assert_eq!(plan.changes[0].path, "name");
        assert!(!plan.requires_replace);
    }

    #[tokio::test]
    async fn test_default_plan_carries_computed_from_prior() {
        let plan = Echo
            .plan(Some(json!({"name": "a", "id": "x"})), json!({"name": "a"}))
            .await
            .unwrap();

        assert_eq!(plan.planned_state["id"], "x");
        assert!(plan.changes.is_empty());
    }

    #[tokio::test]
    async fn test_default_plan_rejects_non_object() {
        let err = Echo.plan(None, json!("nope")).await.unwrap_err();
        assert!(matches!(err, ProviderError::Validation(_)));
    }
}
