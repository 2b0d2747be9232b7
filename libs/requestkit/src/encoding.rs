//! Parameter encodings applied to wire requests.
//!
//! URL encoding follows the bracket conventions most form parsers accept:
//! nested objects become `key[sub]`, arrays `key[]` (or repeated `key`),
//! booleans `1`/`0` (or literals) and `null` an empty value. Keys are
//! emitted in sorted order so the output is deterministic.

use crate::error::EncodingError;
use crate::requestable::WireRequest;
use crate::task::{
    ArrayEncoding, BodyEncoder, BoolEncoding, Destination, EncodableBody, JsonEncoding,
    ParameterEncoding, Parameters, UrlEncoding,
};
use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{HeaderValue, Method, Uri};
use serde_json::Value;

/// Content type written for form-encoded bodies.
pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded; charset=utf-8";

/// Content type written for JSON bodies.
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Percent-encoded query string for `parameters`, without a leading `?`.
#[must_use]
pub fn query_string(parameters: &Parameters, encoding: &UrlEncoding) -> String {
    let mut components = Vec::new();
    for (key, value) in sorted(parameters) {
        query_components(key, value, encoding, &mut components);
    }
    components
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

fn sorted(parameters: &Parameters) -> Vec<(&String, &Value)> {
    let mut entries: Vec<_> = parameters.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));
    entries
}

fn query_components(
    key: &str,
    value: &Value,
    encoding: &UrlEncoding,
    out: &mut Vec<(String, String)>,
) {
    match value {
        Value::Object(map) => {
            for (nested_key, nested) in sorted(map) {
                query_components(&format!("{key}[{nested_key}]"), nested, encoding, out);
            }
        }
        Value::Array(items) => {
            let item_key = match encoding.array_encoding {
                ArrayEncoding::Brackets => format!("{key}[]"),
                ArrayEncoding::NoBrackets => key.to_owned(),
            };
            for item in items {
                query_components(&item_key, item, encoding, out);
            }
        }
        Value::Bool(flag) => {
            let rendered = match (encoding.bool_encoding, flag) {
                (BoolEncoding::Numeric, true) => "1",
                (BoolEncoding::Numeric, false) => "0",
                (BoolEncoding::Literal, true) => "true",
                (BoolEncoding::Literal, false) => "false",
            };
            out.push((key.to_owned(), rendered.to_owned()));
        }
        Value::Null => out.push((key.to_owned(), String::new())),
        Value::Number(number) => out.push((key.to_owned(), number.to_string())),
        Value::String(text) => out.push((key.to_owned(), text.clone())),
    }
}

fn encodes_in_query(destination: Destination, method: &Method) -> bool {
    match destination {
        Destination::QueryString => true,
        Destination::HttpBody => false,
        Destination::MethodDependent => {
            matches!(*method, Method::GET | Method::HEAD | Method::DELETE)
        }
    }
}

/// Append `query` to the URI, keeping any query already present.
///
/// # Errors
/// Returns `EncodingError::InvalidUrl` when the joined URI does not parse.
pub fn append_query(uri: &Uri, query: &str) -> Result<Uri, EncodingError> {
    if query.is_empty() {
        return Ok(uri.clone());
    }
    let rendered = uri.to_string();
    let joined = match uri.query() {
        Some(existing) if !existing.is_empty() => format!("{rendered}&{query}"),
        Some(_) => format!("{rendered}{query}"),
        None => format!("{rendered}?{query}"),
    };
    joined.parse().map_err(|e: http::uri::InvalidUri| EncodingError::InvalidUrl {
        url: joined.clone(),
        reason: e.to_string(),
    })
}

fn set_content_type_if_absent(request: &mut WireRequest, value: &'static str) {
    request
        .headers_mut()
        .entry(CONTENT_TYPE)
        .or_insert(HeaderValue::from_static(value));
}

/// Apply `parameters` to the request according to `encoding`.
///
/// # Errors
/// Fails when the resulting URL is invalid or the JSON body cannot be written.
pub fn encode_parameters(
    request: &mut WireRequest,
    parameters: &Parameters,
    encoding: ParameterEncoding,
) -> Result<(), EncodingError> {
    match encoding {
        ParameterEncoding::Url(url) => encode_url(request, parameters, &url),
        ParameterEncoding::Json(json) => encode_json(request, parameters, json),
    }
}

fn encode_url(
    request: &mut WireRequest,
    parameters: &Parameters,
    encoding: &UrlEncoding,
) -> Result<(), EncodingError> {
    let query = query_string(parameters, encoding);
    if encodes_in_query(encoding.destination, request.method()) {
        let uri = append_query(request.uri(), &query)?;
        *request.uri_mut() = uri;
    } else {
        set_content_type_if_absent(request, FORM_CONTENT_TYPE);
        *request.body_mut() = Bytes::from(query);
    }
    Ok(())
}

fn encode_json(
    request: &mut WireRequest,
    parameters: &Parameters,
    encoding: JsonEncoding,
) -> Result<(), EncodingError> {
    let body = if encoding.pretty {
        serde_json::to_vec_pretty(parameters)?
    } else {
        serde_json::to_vec(parameters)?
    };
    set_content_type_if_absent(request, JSON_CONTENT_TYPE);
    *request.body_mut() = Bytes::from(body);
    Ok(())
}

/// Write `body` as the request body using `encoder`.
///
/// # Errors
/// Fails when the payload cannot be represented or written as JSON.
pub fn encode_body(
    request: &mut WireRequest,
    body: &dyn EncodableBody,
    encoder: &dyn BodyEncoder,
) -> Result<(), EncodingError> {
    let value = body.to_json_value()?;
    let bytes = encoder.encode(&value)?;
    set_content_type_if_absent(request, encoder.content_type());
    *request.body_mut() = Bytes::from(bytes);
    Ok(())
}
