use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::env;
use std::path::Path;

/// A field extracted from an invoice image, annotated with a confidentiality
/// score in [0, 1]. The score is advisory only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfidentialField {
    pub value: String,
    pub confidentiality: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineItem {
    pub description: ConfidentialField,
    pub quantity: ConfidentialField,
    pub unit_price: ConfidentialField,
    pub total_price: ConfidentialField,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceData {
    pub invoice_id: ConfidentialField,
    pub company_name: ConfidentialField,
    pub company_code: ConfidentialField,
    pub vat_payer_code: ConfidentialField,
    pub company_address: ConfidentialField,
    pub invoice_date: ConfidentialField,
    pub total_amount: ConfidentialField,
    pub total_amount_currency: ConfidentialField,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_items: Option<Vec<LineItem>>,
}

#[derive(Debug)]
pub enum ExtractError {
    Config(String),
    Io(std::io::Error),
    Http(reqwest::Error),
    MissingToolCall,
    InvalidPayload(serde_json::Error),
    InvalidSchema(String),
}

impl std::fmt::Display for ExtractError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractError::Config(e) => write!(f, "extractor config error: {e}"),
            ExtractError::Io(e) => write!(f, "failed to read image: {e}"),
            ExtractError::Http(e) => write!(f, "completion request failed: {e}"),
            ExtractError::MissingToolCall => write!(f, "response carried no extract_invoice tool call"),
            ExtractError::InvalidPayload(e) => write!(f, "tool arguments were not valid JSON: {e}"),
            ExtractError::InvalidSchema(e) => write!(f, "extracted data failed validation: {e}"),
        }
    }
}

impl std::error::Error for ExtractError {}

impl From<reqwest::Error> for ExtractError {
    fn from(e: reqwest::Error) -> Self {
        ExtractError::Http(e)
    }
}

impl InvoiceData {
    fn fields(&self) -> [(&'static str, &ConfidentialField); 8] {
        [
            ("invoice_id", &self.invoice_id),
            ("company_name", &self.company_name),
            ("company_code", &self.company_code),
            ("vat_payer_code", &self.vat_payer_code),
            ("company_address", &self.company_address),
            ("invoice_date", &self.invoice_date),
            ("total_amount", &self.total_amount),
            ("total_amount_currency", &self.total_amount_currency),
        ]
    }

    pub fn validate(&self) -> Result<(), ExtractError> {
        for (name, field) in self.fields() {
            check_score(name, field)?;
        }
        if let Some(items) = &self.line_items {
            for (i, item) in items.iter().enumerate() {
                for (name, field) in [
                    ("description", &item.description),
                    ("quantity", &item.quantity),
                    ("unit_price", &item.unit_price),
                    ("total_price", &item.total_price),
                ] {
                    check_score(&format!("line_items[{i}].{name}"), field)?;
                }
            }
        }
        Ok(())
    }
}

fn check_score(name: &str, field: &ConfidentialField) -> Result<(), ExtractError> {
    if !(0.0..=1.0).contains(&field.confidentiality) || field.confidentiality.is_nan() {
        return Err(ExtractError::InvalidSchema(format!(
            "confidentiality score for {name} is out of range: {}",
            field.confidentiality
        )));
    }
    Ok(())
}

fn confidential_string_schema(description: &str) -> Value {
    json!({
        "type": "object",
        "properties": {
            "value": { "type": "string", "description": description },
            "confidentiality": {
                "type": "number",
                "minimum": 0,
                "maximum": 1,
                "description": "Confidentiality score for this field (0 = public, 1 = highly confidential)"
            }
        },
        "required": ["value", "confidentiality"]
    })
}

/// JSON-schema parameters of the `extract_invoice` tool, mirroring the
/// invoice fields the prefill form understands.
pub fn invoice_tool_parameters() -> Value {
    let line_item = json!({
        "type": "object",
        "description": "Detailed breakdown of items or services billed on the invoice, with confidentiality score",
        "properties": {
            "description": confidential_string_schema("Description of the product or service being invoiced"),
            "quantity": confidential_string_schema("Quantity of the item provided"),
            "unit_price": confidential_string_schema("Price per unit of the item"),
            "total_price": confidential_string_schema("Total price for the item (quantity * unit price)")
        },
        "required": ["description", "quantity", "unit_price", "total_price"]
    });

    json!({
        "type": "object",
        "properties": {
            "invoice_id": confidential_string_schema("Unique invoice number or identifier used for tracking and reference"),
            "company_name": confidential_string_schema("Name of the seller or service provider issuing the invoice"),
            "company_code": confidential_string_schema("Registration code of the seller/provider company"),
            "vat_payer_code": confidential_string_schema("VAT payer code of the seller/provider company"),
            "company_address": confidential_string_schema("Official address of the seller/provider company"),
            "invoice_date": confidential_string_schema("Issuance date of the invoice"),
            "total_amount": confidential_string_schema("Total monetary amount stated on the invoice"),
            "total_amount_currency": confidential_string_schema("Currency used for the total invoice amount, e.g., EUR, USD"),
            "line_items": {
                "type": "array",
                "description": "List of individual line items included in the invoice, with quantities and pricing",
                "items": line_item
            }
        },
        "required": [
            "invoice_id", "company_name", "company_code", "vat_payer_code",
            "company_address", "invoice_date", "total_amount", "total_amount_currency"
        ]
    })
}

/// Parses and validates the arguments of the tool call returned by the
/// completion endpoint.
pub fn parse_tool_arguments(arguments: &str) -> Result<InvoiceData, ExtractError> {
    let data: InvoiceData =
        serde_json::from_str(arguments).map_err(ExtractError::InvalidPayload)?;
    data.validate()?;
    Ok(data)
}

/// Sends the image at `path` to the Azure OpenAI chat-completions endpoint
/// and returns the structured invoice fields. Best-effort enrichment: the
/// upload handler logs and swallows any error from here, so a failure never
/// blocks the upload itself. One blocking call, no retry.
pub async fn extract_invoice_from_image(path: &Path) -> Result<InvoiceData, ExtractError> {
    let endpoint = env::var("AZURE_OPENAI_ENDPOINT")
        .map_err(|_| ExtractError::Config("AZURE_OPENAI_ENDPOINT not set".to_string()))?;
    let deployment = env::var("AZURE_OPENAI_DEPLOYMENT")
        .map_err(|_| ExtractError::Config("AZURE_OPENAI_DEPLOYMENT not set".to_string()))?;
    let api_version = env::var("AZURE_OPENAI_API_VERSION")
        .map_err(|_| ExtractError::Config("AZURE_OPENAI_API_VERSION not set".to_string()))?;
    let api_key = env::var("AZURE_OPENAI_API_KEY")
        .map_err(|_| ExtractError::Config("AZURE_OPENAI_API_KEY not set".to_string()))?;

    let image = tokio::fs::read(path).await.map_err(ExtractError::Io)?;
    let base64_image = base64::engine::general_purpose::STANDARD.encode(image);

    let body = json!({
        "model": deployment,
        "temperature": 0,
        "messages": [
            {
                "role": "system",
                "content": "You are the best structured data extraction algorithm. You extract invoice fields with a numeric confidentiality score (0-1) for each field, where 1 is the most confidential."
            },
            {
                "role": "user",
                "content": [
                    {
                        "type": "text",
                        "text": "Extract all invoice fields and line items from this image. For each extracted field, include a 'confidentiality' score from 0 (public) to 1 (highly confidential) based on content sensitivity. Return structured JSON in the provided schema format."
                    },
                    {
                        "type": "image_url",
                        "image_url": { "url": format!("data:image/png;base64,{base64_image}") }
                    }
                ]
            }
        ],
        "tools": [
            {
                "type": "function",
                "function": {
                    "name": "extract_invoice",
                    "description": "Extract invoice fields, line items, and per-field confidentiality scores (0-1)",
                    "parameters": invoice_tool_parameters()
                }
            }
        ],
        "tool_choice": {
            "type": "function",
            "function": { "name": "extract_invoice" }
        }
    });

    let url = format!(
        "{}/openai/deployments/{}/chat/completions?api-version={}",
        endpoint.trim_end_matches('/'),
        deployment,
        api_version
    );

    let response: Value = reqwest::Client::new()
        .post(&url)
        .header("api-key", api_key)
        .json(&body)
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;

    let arguments = response
        .pointer("/choices/0/message/tool_calls/0/function/arguments")
        .and_then(Value::as_str)
        .ok_or(ExtractError::MissingToolCall)?;

    parse_tool_arguments(arguments)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(value: &str, confidentiality: f64) -> Value {
        json!({ "value": value, "confidentiality": confidentiality })
    }

    fn sample_arguments() -> Value {
        json!({
            "invoice_id": field("INV-2024-001", 0.2),
            "company_name": field("Acme GmbH", 0.1),
            "company_code": field("123456789", 0.4),
            "vat_payer_code": field("LT100001234", 0.5),
            "company_address": field("Main St. 1, Vilnius", 0.3),
            "invoice_date": field("2024-05-02", 0.0),
            "total_amount": field("850.00", 0.6),
            "total_amount_currency": field("EUR", 0.0),
        })
    }

    #[test]
    fn parses_a_complete_tool_call() {
        let data = parse_tool_arguments(&sample_arguments().to_string()).unwrap();
        assert_eq!(data.total_amount.value, "850.00");
        assert_eq!(data.total_amount_currency.value, "EUR");
        assert!(data.line_items.is_none());
    }

    #[test]
    fn parses_optional_line_items() {
        let mut args = sample_arguments();
        args["line_items"] = json!([{
            "description": field("Consulting", 0.2),
            "quantity": field("2", 0.0),
            "unit_price": field("425.00", 0.3),
            "total_price": field("850.00", 0.3),
        }]);
        let data = parse_tool_arguments(&args.to_string()).unwrap();
        assert_eq!(data.line_items.unwrap().len(), 1);
    }

    #[test]
    fn rejects_missing_fields() {
        let mut args = sample_arguments();
        args.as_object_mut().unwrap().remove("total_amount");
        assert!(matches!(
            parse_tool_arguments(&args.to_string()),
            Err(ExtractError::InvalidPayload(_))
        ));
    }

    #[test]
    fn rejects_out_of_range_confidentiality() {
        let mut args = sample_arguments();
        args["invoice_id"] = field("INV-1", 1.5);
        assert!(matches!(
            parse_tool_arguments(&args.to_string()),
            Err(ExtractError::InvalidSchema(_))
        ));

        let mut args = sample_arguments();
        args["company_name"] = field("Acme", -0.1);
        assert!(parse_tool_arguments(&args.to_string()).is_err());
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(matches!(
            parse_tool_arguments("{not json"),
            Err(ExtractError::InvalidPayload(_))
        ));
    }

    #[test]
    fn tool_schema_lists_every_required_field() {
        let schema = invoice_tool_parameters();
        let required: Vec<&str> = schema["required"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(Value::as_str)
            .collect();
        assert_eq!(required.len(), 8);
        assert!(required.contains(&"total_amount_currency"));
        assert!(schema["properties"]["line_items"]["items"].is_object());
    }
}
