use async_trait::async_trait;
use serde_json::{json, Value};

use super::Tool;
use crate::workflow::schema::Schema;

/// Compares medicines side by side. Returns canned text until a real
/// product-data source is wired in.
pub struct ComparisonTool;

#[async_trait]
impl Tool for ComparisonTool {
    fn id(&self) -> &str {
        "comparison-tool"
    }

    fn description(&self) -> &str {
        "Compares multiple medicines side by side"
    }

    fn input_schema(&self) -> Schema {
        Schema::object()
            .field("products", Schema::array(Schema::String))
            .build()
    }

    fn output_schema(&self) -> Schema {
        Schema::object().field("comparison", Schema::String).build()
    }

    async fn execute(&self, input: Value) -> Value {
        let products: Vec<&str> = input["products"]
            .as_array()
            .map(|items| items.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();
        json!({ "comparison": format!("Comparison of {} (mock data).", products.join(" vs ")) })
    }
}
