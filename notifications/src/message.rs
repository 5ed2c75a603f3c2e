use entities::devices::PushToken;
use serde_json::{json, Map, Value};
use use_cases::flash_offers::payload::{AndroidPriority, NotificationPayload};

/// Renders the FCM HTTP v1 `messages:send` body for one token.
pub(crate) fn for_token(token: &PushToken, payload: &NotificationPayload) -> Value {
    let data = payload
        .data
        .as_string_map()
        .into_iter()
        .map(|(key, value)| (key.to_string(), Value::String(value)))
        .collect::<Map<_, _>>();
    let priority = match payload.android.priority {
        AndroidPriority::High => "HIGH",
    };

    json!({
        "message": {
            "token": token.as_ref(),
            "notification": {
                "title": payload.title,
                "body": payload.body,
            },
            "data": data,
            "android": {
                "priority": priority,
                "notification": {
                    "channel_id": payload.android.channel_id,
                },
            },
            "apns": {
                "headers": {
                    "apns-priority": "10",
                },
                "payload": {
                    "aps": {
                        "content-available": payload.ios.content_available,
                        "sound": payload.ios.sound,
                    },
                },
            },
        }
    })
}

/// Pulls the most specific error code out of an FCM error body.
pub(crate) fn error_code(body: &Value) -> Option<String> {
    let error = body.get("error")?;
    error
        .get("details")
        .and_then(Value::as_array)
        .and_then(|details| {
            details
                .iter()
                .find_map(|detail| detail.get("errorCode").and_then(Value::as_str))
        })
        .or_else(|| error.get("status").and_then(Value::as_str))
        .map(str::to_string)
}

pub(crate) fn error_message(body: &Value) -> String {
    body.pointer("/error/message")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_default()
}
