use sepa_model::{
    ARBindingsResults, BindingsResults, ErrorResponse, Notification, SubscribeResponse,
};
use serde::Deserialize;
use serde_json::{Map, Value};

/// A frame received on the subscription channel, classified by its discriminant key.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum InboundMessage {
    Ping,
    Subscribed(SubscribeResponse),
    Unsubscribed(String),
    Notification(Notification),
    Error(ErrorResponse),
}

impl InboundMessage {
    /// Classifies on the first of `ping`, `subscribed`, `unsubscribed`, `results`, `code` present.
    pub(crate) fn parse(frame: &str) -> Result<Self, ErrorResponse> {
        let value: Value = serde_json::from_str(frame)
            .map_err(|e| ErrorResponse::malformed(format!("Invalid JSON frame: {e}")))?;
        let Value::Object(object) = value else {
            return Err(ErrorResponse::malformed("The frame is not a JSON object"));
        };

        if object.contains_key("ping") {
            Ok(InboundMessage::Ping)
        } else if let Some(spuid) = object.get("subscribed") {
            Ok(InboundMessage::Subscribed(SubscribeResponse {
                spuid: string_field(spuid, "subscribed")?,
                alias: object
                    .get("alias")
                    .and_then(Value::as_str)
                    .map(str::to_owned),
                first_results: match object.get("firstResults") {
                    Some(first) => BindingsResults::deserialize(first).map_err(|e| {
                        ErrorResponse::malformed(format!("Invalid firstResults: {e}"))
                    })?,
                    None => BindingsResults::default(),
                },
            }))
        } else if let Some(spuid) = object.get("unsubscribed") {
            Ok(InboundMessage::Unsubscribed(string_field(
                spuid,
                "unsubscribed",
            )?))
        } else if let Some(results) = object.get("results") {
            parse_notification(&object, results).map(InboundMessage::Notification)
        } else if let Some(code) = object.get("code") {
            let code = code
                .as_u64()
                .and_then(|code| u16::try_from(code).ok())
                .ok_or_else(|| ErrorResponse::malformed("Invalid error code"))?;
            let message = match object.get("body") {
                Some(Value::String(body)) => body.clone(),
                Some(body) => body.to_string(),
                None => String::new(),
            };
            Ok(InboundMessage::Error(ErrorResponse::server(code, message)))
        } else {
            Err(ErrorResponse::malformed("Unrecognized frame"))
        }
    }
}

/// The spuid is at the top level or inside `results`, depending on the broker version.
fn parse_notification(
    object: &Map<String, Value>,
    results: &Value,
) -> Result<Notification, ErrorResponse> {
    let spuid = object
        .get("spuid")
        .or_else(|| results.get("spuid"))
        .ok_or_else(|| ErrorResponse::malformed("Notification without spuid"))?;
    let sequence = object
        .get("sequence")
        .or_else(|| results.get("sequence"))
        .and_then(Value::as_u64);
    let results = ARBindingsResults::deserialize(results)
        .map_err(|e| ErrorResponse::malformed(format!("Invalid notification results: {e}")))?;
    Ok(Notification {
        spuid: string_field(spuid, "spuid")?,
        sequence,
        results,
    })
}

fn string_field(value: &Value, name: &str) -> Result<String, ErrorResponse> {
    value
        .as_str()
        .map(str::to_owned)
        .ok_or_else(|| ErrorResponse::malformed(format!("'{name}' is not a string")))
}
