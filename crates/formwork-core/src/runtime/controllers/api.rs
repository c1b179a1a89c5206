// formwork-core/src/runtime/controllers/api.rs
// ============================================================================
// Module: Formwork API Controllers
// Description: JSON controllers for describe, record CRUD, lookup, and settings.
// Purpose: Serve the HTTP/CLI record API used by generated forms and tables.
// Dependencies: crate::core, crate::runtime, serde_json
// ============================================================================

//! ## Overview
//! API controllers always answer with JSON. Their permission derives from the
//! `model` parameter (`Crm/Customer:Read`, `:Create`, `:Update`, `:Delete`),
//! so a role can be granted access to exactly the models it manages. Record
//! ids cross this boundary sealed unless the application runs with plain ids.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use serde_json::Map;
use serde_json::Value;
use serde_json::json;

use crate::core::DataType;
use crate::core::ModelName;
use crate::core::ModelSpec;
use crate::core::RecordAction;
use crate::core::permissions::record_permission;
use crate::core::record::ID_KEY;
use crate::core::record::Record;
use crate::core::record::is_truthy;
use crate::interfaces::ListQuery;
use crate::runtime::app::RenderError;
use crate::runtime::audit::AuditEvent;
use crate::runtime::controllers::Controller;
use crate::runtime::controllers::ControllerContext;
use crate::runtime::describe::form_describe;
use crate::runtime::describe::table_describe;
use crate::runtime::plugins::EVENT_AFTER_RECORD_DELETE;
use crate::runtime::plugins::EVENT_AFTER_RECORD_SAVE;
use crate::runtime::records::DEFAULT_MAX_RELATION_LEVEL;
use crate::runtime::records::cascade_permissions;
use crate::runtime::records::parse_order_by;

// ============================================================================
// SECTION: Registration
// ============================================================================

/// Returns the built-in API controllers.
#[must_use]
pub fn builtin_controllers() -> Vec<Arc<dyn Controller>> {
    vec![
        Arc::new(FormDescribe),
        Arc::new(TableDescribe),
        Arc::new(RecordGet),
        Arc::new(RecordGetList),
        Arc::new(RecordLookup),
        Arc::new(RecordSave),
        Arc::new(RecordDelete),
        Arc::new(ConfigSet),
    ]
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Builds the record permission for the `model` parameter.
fn model_permission(params: &Map<String, Value>, action: RecordAction) -> Option<String> {
    let model = params.get("model").and_then(Value::as_str).unwrap_or_default();
    Some(record_permission(&ModelName::new(model), action))
}

/// Resolves the `model` parameter.
fn model_param<'a>(ctx: &ControllerContext<'a>) -> Result<&'a ModelSpec, RenderError> {
    let name = ctx.require_str("model")?;
    ctx.app.registry().get(name).map_err(|err| RenderError::ModelNotFound(err.to_string()))
}

/// Reads an unsigned integer parameter from a number or numeric string.
fn param_u32(params: &Map<String, Value>, key: &str) -> Option<u32> {
    match params.get(key)? {
        Value::Number(number) => number.as_u64().and_then(|value| u32::try_from(value).ok()),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

/// Seals ids in an outgoing record.
fn seal(ctx: &ControllerContext<'_>, model: &ModelSpec, mut record: Record) -> Value {
    let registry = ctx.app.registry();
    ctx.app.codec().seal_ids(&mut record, model, &|name| registry.find(name));
    Value::Object(record)
}

/// Returns true when the submitted record addresses an existing row.
fn is_existing_record(params: &Map<String, Value>) -> bool {
    match params.get("record").and_then(|record| record.get(ID_KEY)) {
        None | Some(Value::Null) => false,
        Some(Value::String(text)) => !matches!(text.trim(), "" | "0"),
        Some(Value::Number(number)) => number.as_i64().is_some_and(|id| id > 0),
        Some(_) => true,
    }
}

// ============================================================================
// SECTION: Describe Controllers
// ============================================================================

/// `Api/Form/Describe`: form description of a model.
pub struct FormDescribe;

impl Controller for FormDescribe {
    fn name(&self) -> &str {
        "Api/Form/Describe"
    }

    fn permission(&self, params: &Map<String, Value>) -> Option<String> {
        model_permission(params, RecordAction::Read)
    }

    fn render_json(&self, ctx: &ControllerContext<'_>) -> Result<Option<Value>, RenderError> {
        let model = model_param(ctx)?;
        let permissions = ctx.app.policy().record_actions(ctx.user, &model.name);
        let description = form_describe(model, ctx.params, permissions);
        serde_json::to_value(description)
            .map(Some)
            .map_err(|err| RenderError::Internal(err.to_string()))
    }
}

/// `Api/Table/Describe`: table description of a model.
pub struct TableDescribe;

impl Controller for TableDescribe {
    fn name(&self) -> &str {
        "Api/Table/Describe"
    }

    fn permission(&self, params: &Map<String, Value>) -> Option<String> {
        model_permission(params, RecordAction::Read)
    }

    fn render_json(&self, ctx: &ControllerContext<'_>) -> Result<Option<Value>, RenderError> {
        let model = model_param(ctx)?;
        let permissions = ctx.app.policy().record_actions(ctx.user, &model.name);
        let description = table_describe(model, ctx.params, permissions);
        serde_json::to_value(description)
            .map(Some)
            .map_err(|err| RenderError::Internal(err.to_string()))
    }
}

// ============================================================================
// SECTION: Record Controllers
// ============================================================================

/// `Api/Record/Get`: one record with relations.
pub struct RecordGet;

impl Controller for RecordGet {
    fn name(&self) -> &str {
        "Api/Record/Get"
    }

    fn permission(&self, params: &Map<String, Value>) -> Option<String> {
        model_permission(params, RecordAction::Read)
    }

    fn render_json(&self, ctx: &ControllerContext<'_>) -> Result<Option<Value>, RenderError> {
        let model = model_param(ctx)?;
        let id = ctx.app.codec().open(ctx.params.get(ID_KEY)).map_err(RenderError::from)?;
        let include_relations = ctx.params.get("includeRelations").is_none_or(is_truthy);
        let max_level =
            param_u32(ctx.params, "maxRelationLevel").unwrap_or(DEFAULT_MAX_RELATION_LEVEL);
        let record =
            ctx.app.records().get(model.name.as_str(), id, include_relations, max_level)?;
        Ok(Some(seal(ctx, model, record)))
    }
}

/// `Api/Record/GetList`: paged, searchable record list.
pub struct RecordGetList;

impl Controller for RecordGetList {
    fn name(&self) -> &str {
        "Api/Record/GetList"
    }

    fn permission(&self, params: &Map<String, Value>) -> Option<String> {
        model_permission(params, RecordAction::Read)
    }

    fn render_json(&self, ctx: &ControllerContext<'_>) -> Result<Option<Value>, RenderError> {
        let model = model_param(ctx)?;
        let mut query = ListQuery::default();
        query.search = ctx.param_str("search").filter(|s| !s.trim().is_empty()).map(str::to_string);
        if let Some(order) = ctx.param_str("orderBy") {
            query.order_by = parse_order_by(model, order)?;
        }
        query.page = param_u32(ctx.params, "page").unwrap_or(1);
        query.items_per_page = param_u32(ctx.params, "itemsPerPage").unwrap_or(query.items_per_page);
        if let Some(Value::Object(filters)) = ctx.params.get("filters") {
            for (column, value) in filters {
                let is_id = column == ID_KEY
                    || model.column(column).is_some_and(|c| c.data_type == DataType::Lookup);
                let value = if is_id {
                    let id = ctx.app.codec().open(Some(value)).map_err(RenderError::from)?;
                    Value::from(id.get())
                } else {
                    value.clone()
                };
                query.filters.insert(column.clone(), value);
            }
        }
        let list = ctx.app.records().get_list(model.name.as_str(), &query)?;
        let data: Vec<Value> = list.data.into_iter().map(|record| seal(ctx, model, record)).collect();
        Ok(Some(json!({
            "data": data,
            "total": list.total,
            "page": list.page,
            "itemsPerPage": list.items_per_page,
        })))
    }
}

/// `Api/Record/Lookup`: id to lookup-text map for select inputs.
pub struct RecordLookup;

impl Controller for RecordLookup {
    fn name(&self) -> &str {
        "Api/Record/Lookup"
    }

    fn permission(&self, params: &Map<String, Value>) -> Option<String> {
        model_permission(params, RecordAction::Read)
    }

    fn render_json(&self, ctx: &ControllerContext<'_>) -> Result<Option<Value>, RenderError> {
        let model = model_param(ctx)?;
        let found = ctx.app.records().lookup(model.name.as_str(), ctx.param_str("search"))?;
        let codec = ctx.app.codec();
        let mut data = Map::new();
        for (_, entry) in found {
            let Value::Object(mut entry) = entry else {
                continue;
            };
            let id = entry.get(ID_KEY).and_then(Value::as_i64).unwrap_or_default();
            let encoded = codec.encode(id.into());
            let key = match &encoded {
                Value::String(token) => token.clone(),
                other => other.to_string(),
            };
            entry.insert(ID_KEY.to_string(), encoded);
            data.insert(key, Value::Object(entry));
        }
        Ok(Some(json!({"data": data})))
    }
}

/// `Api/Record/Save`: nested save cascade.
pub struct RecordSave;

impl Controller for RecordSave {
    fn name(&self) -> &str {
        "Api/Record/Save"
    }

    fn permission(&self, params: &Map<String, Value>) -> Option<String> {
        let action =
            if is_existing_record(params) { RecordAction::Update } else { RecordAction::Create };
        model_permission(params, action)
    }

    fn render_json(&self, ctx: &ControllerContext<'_>) -> Result<Option<Value>, RenderError> {
        let model = model_param(ctx)?;
        let Some(Value::Object(submitted)) = ctx.params.get("record") else {
            return Err(RenderError::BadRequest("missing parameter: record".to_string()));
        };
        let mut record = submitted.clone();
        let registry = ctx.app.registry();
        ctx.app
            .codec()
            .decrypt_ids(&mut record, model, &|name| registry.find(name))
            .map_err(RenderError::from)?;
        let required = cascade_permissions(registry, model, &record)
            .map_err(|err| RenderError::ModelNotFound(err.to_string()))?;
        for permission in required {
            let allowed = ctx.user.is_some_and(|user| ctx.app.policy().allows(user, &permission));
            if !allowed {
                return Err(RenderError::NotEnoughPermissions {
                    permission,
                    signed_in: ctx.user.is_some(),
                });
            }
        }
        let outcome = ctx.app.records().save(model.name.as_str(), record)?;
        let saved_id = outcome.saved_record.get(ID_KEY).and_then(Value::as_i64).unwrap_or_default();
        ctx.app.audit(&AuditEvent::record_save(model.name.as_str(), saved_id, ctx.user_id()));
        let _outcome = ctx.app.plugins().dispatch(
            EVENT_AFTER_RECORD_SAVE,
            json!({"model": model.name.as_str(), "id": saved_id}),
        );
        Ok(Some(json!({
            "status": "success",
            "originalRecord": Value::Object(submitted.clone()),
            "savedRecord": seal(ctx, model, outcome.saved_record),
        })))
    }
}

/// `Api/Record/Delete`: delete one record.
pub struct RecordDelete;

impl Controller for RecordDelete {
    fn name(&self) -> &str {
        "Api/Record/Delete"
    }

    fn permission(&self, params: &Map<String, Value>) -> Option<String> {
        model_permission(params, RecordAction::Delete)
    }

    fn render_json(&self, ctx: &ControllerContext<'_>) -> Result<Option<Value>, RenderError> {
        let model = model_param(ctx)?;
        let id = ctx.app.codec().open(ctx.params.get(ID_KEY)).map_err(RenderError::from)?;
        if !id.is_persisted() {
            return Err(RenderError::BadRequest("missing parameter: id".to_string()));
        }
        let deleted = ctx.app.records().delete(model.name.as_str(), id)?;
        if deleted {
            ctx.app.audit(&AuditEvent::record_delete(model.name.as_str(), id.get(), ctx.user_id()));
            let _outcome = ctx.app.plugins().dispatch(
                EVENT_AFTER_RECORD_DELETE,
                json!({"model": model.name.as_str(), "id": id.get()}),
            );
        }
        Ok(Some(json!({"status": "success", "deleted": deleted})))
    }
}

// ============================================================================
// SECTION: Settings Controller
// ============================================================================

/// `Api/Config/Set`: persist a settings value.
pub struct ConfigSet;

impl Controller for ConfigSet {
    fn name(&self) -> &str {
        "Api/Config/Set"
    }

    fn render_json(&self, ctx: &ControllerContext<'_>) -> Result<Option<Value>, RenderError> {
        let path = ctx.require_str("path")?;
        let value = ctx.params.get("value").cloned().unwrap_or(Value::Null);
        ctx.app.settings().save(path, &value, ctx.user_id())?;
        Ok(Some(json!({"status": "success", "path": path})))
    }
}
