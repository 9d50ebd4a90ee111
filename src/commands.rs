//! Command execution.

use crate::OneShot;
use colored::Colorize;
use docflow_api::CommandHandler;
use docflow_core::duration::format_duration;
use docflow_core::{
    compile, validate as validate_definition, Clock, SystemClock, WorkflowDefinitionRaw,
};
use docflow_protocol::jsonl::{self, LineDecoder};
use docflow_protocol::{ErrorCode, Operation, ProtocolError, Request, Response, ResponseError};
use serde_json::{json, Value};
use std::path::Path;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Validates and compiles a definition file, returning a summary.
pub fn validate(path: &Path) -> Result<String, Box<dyn std::error::Error>> {
    let bytes = std::fs::read(path)?;
    let raw = WorkflowDefinitionRaw::from_slice(&bytes)?;
    let checksum = raw.checksum();
    let definition = validate_definition(raw, SystemClock.now())?;
    let compiled = compile(&definition)?;

    let mut output = format!(
        "{} {} (checksum: {})\n",
        "Valid".green(),
        definition.name().cyan(),
        checksum
    );

    output.push_str(&format!("{}\n", "States:".bold()));
    for state in definition.states() {
        let mut line = format!("  {}", state.name);
        if state.initial {
            line.push_str(&format!(" {}", "[initial]".green()));
        }
        if state.terminal {
            line.push_str(&format!(" {}", "[terminal]".yellow()));
        }
        if let Some(sla) = compiled.sla_for(&state.name) {
            line.push_str(&format!(" sla={}", format_duration(sla)));
        }
        output.push_str(&line);
        output.push('\n');

        for t in compiled.transitions_from(&state.name) {
            let roles = if t.roles.is_empty() {
                "anyone".dimmed().to_string()
            } else {
                t.roles.to_vec().join(", ")
            };
            output.push_str(&format!("    {} -> {} ({})\n", t.event.cyan(), t.to, roles));
        }
    }

    if let Some(policy) = compiled.reapproval() {
        output.push_str(&format!(
            "{} after {} back to {}\n",
            "Re-approval:".bold(),
            format_duration(policy.after),
            policy.to_state
        ));
    }

    Ok(output.trim_end().to_string())
}

/// Executes a one-shot command and returns the formatted output.
pub fn execute(
    handler: &CommandHandler,
    cmd: OneShot,
) -> Result<String, Box<dyn std::error::Error>> {
    match cmd {
        OneShot::CreateWorkflow { file } => {
            let text = std::fs::read_to_string(&file)?;
            let result = call(
                handler,
                Operation::CreateWorkflow,
                json!({"definition": text}),
            )?;
            Ok(format!(
                "{} workflow {} (checksum: {})",
                "Created".green(),
                result["workflow_id"].as_str().unwrap_or("?").cyan(),
                result["checksum"].as_str().unwrap_or("?")
            ))
        }

        OneShot::GetWorkflow { id } => {
            let result = call(handler, Operation::GetWorkflow, json!({"workflow_id": id}))?;
            Ok(format!(
                "{}\n{}",
                format!("Workflow {}", id.cyan()).bold(),
                format_json(&result["definition"])
            ))
        }

        OneShot::CreateDocument { workflow, data } => {
            let data = data.map(|d| parse_json_arg(&d)).transpose()?;
            let result = call(
                handler,
                Operation::CreateDocument,
                json!({"workflow_id": workflow, "data": data.unwrap_or(Value::Null)}),
            )?;
            Ok(format!("{} {}", "Created".green(), format_document(&result)))
        }

        OneShot::GetDocument { id } => {
            let result = call(handler, Operation::GetDocument, json!({"document_id": id}))?;
            Ok(format_document(&result))
        }

        OneShot::ApplyEvent {
            document,
            event,
            roles,
        } => {
            let result = call(
                handler,
                Operation::ApplyEvent,
                json!({"document_id": document, "event": event, "roles": roles}),
            )?;
            Ok(format!("{} {}", "Applied".green(), format_document(&result)))
        }

        OneShot::AvailableEvents { document, roles } => {
            let result = call(
                handler,
                Operation::AvailableEvents,
                json!({"document_id": document, "roles": roles}),
            )?;
            let events = result["events"]
                .as_array()
                .map(|e| {
                    e.iter()
                        .filter_map(|x| x.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                })
                .unwrap_or_default();
            if events.is_empty() {
                return Ok("No events available".yellow().to_string());
            }
            Ok(format!(
                "{} in {}: {}",
                document.cyan(),
                result["current"].as_str().unwrap_or("?").yellow(),
                events
            ))
        }
    }
}

/// Serves JSON-lines requests from stdin until EOF or Ctrl-C.
pub async fn serve(handler: CommandHandler) -> Result<(), Box<dyn std::error::Error>> {
    let mut stdin = tokio::io::stdin();
    let mut stdout = tokio::io::stdout();
    let mut decoder = LineDecoder::new();
    let mut buf = vec![0u8; 8192];
    let mut out = Vec::new();

    tracing::info!("Serving JSON lines on stdio");

    loop {
        let n = tokio::select! {
            read = stdin.read(&mut buf) => read?,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received shutdown signal, stopping...");
                break;
            }
        };

        if n == 0 {
            // Treat a final unterminated line as complete.
            if decoder.buffered() > 0 {
                out.clear();
                decoder.extend(b"\n");
                respond_all(&handler, &mut decoder, &mut out)?;
                stdout.write_all(&out).await?;
            }
            break;
        }

        decoder.extend(&buf[..n]);
        out.clear();
        respond_all(&handler, &mut decoder, &mut out)?;
        if !out.is_empty() {
            stdout.write_all(&out).await?;
            stdout.flush().await?;
        }
    }

    stdout.flush().await?;
    tracing::info!("Stopped");
    Ok(())
}

/// Answers every complete line in `decoder`, appending encoded responses to
/// `out`. Undecodable lines get an error response with an empty id.
fn respond_all(
    handler: &CommandHandler,
    decoder: &mut LineDecoder,
    out: &mut Vec<u8>,
) -> Result<(), ProtocolError> {
    loop {
        let response = match decoder.decode_line::<Request>() {
            Ok(Some(request)) => handler.handle(&request),
            Ok(None) => return Ok(()),
            Err(e) => {
                tracing::warn!("Rejected request line: {}", e);
                let code = match e {
                    ProtocolError::LineTooLong { .. } => ErrorCode::PayloadTooLarge,
                    _ => ErrorCode::BadRequest,
                };
                Response::error("", ResponseError::new(code, e.to_string()))
            }
        };
        out.extend_from_slice(&jsonl::encode_response(&response)?);
    }
}

/// Sends one request through the handler and unwraps the result.
fn call(
    handler: &CommandHandler,
    op: Operation,
    params: Value,
) -> Result<Value, Box<dyn std::error::Error>> {
    let response = handler.handle(&Request::new("cli", op).with_params(params));
    match (response.result, response.error) {
        (Some(result), _) => Ok(result),
        (None, Some(error)) => Err(format!("{}: {}", error.code, error.message).into()),
        (None, None) => Err("empty response".into()),
    }
}

/// Parses a JSON argument (supports @file syntax).
fn parse_json_arg(arg: &str) -> Result<Value, Box<dyn std::error::Error>> {
    if let Some(path) = arg.strip_prefix('@') {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    } else {
        Ok(serde_json::from_str(arg)?)
    }
}

fn format_document(doc: &Value) -> String {
    let mut output = format!(
        "document {}\n  Workflow: {}\n  State: {}\n  Updated: {}",
        doc["id"].as_str().unwrap_or("?").cyan(),
        doc["workflowId"].as_str().unwrap_or("?"),
        doc["current"].as_str().unwrap_or("?").yellow(),
        doc["updatedAt"].as_str().unwrap_or("?"),
    );
    if let Some(due) = doc["dueAt"].as_str() {
        output.push_str(&format!("\n  Due: {}", due));
    }
    if let Some(next) = doc["nextReapproval"].as_str() {
        output.push_str(&format!("\n  Re-approval: {}", next));
    }
    if !doc["data"].is_null() {
        output.push_str(&format!("\n  Data: {}", format_json(&doc["data"])));
    }
    output
}

/// Formats JSON for display.
fn format_json(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use docflow_api::Config;
    use tempfile::TempDir;

    const DEFINITION: &str = r#"{
        "name": "ContractReview",
        "states": [
            {"name": "Draft", "initial": true},
            {"name": "Legal"},
            {"name": "Signed", "terminal": true}
        ],
        "transitions": [
            {"from": "Draft", "to": "Legal", "event": "submit"},
            {"from": "Legal", "to": "Signed", "event": "approve", "roles": ["legal"]}
        ],
        "sla": {"Legal": "120h"}
    }"#;

    fn handler() -> CommandHandler {
        CommandHandler::from_config(&Config::default()).unwrap()
    }

    fn decode_all(out: &[u8]) -> Vec<Response> {
        out.split(|b| *b == b'\n')
            .filter(|line| !line.is_empty())
            .map(|line| serde_json::from_slice(line).unwrap())
            .collect()
    }

    #[test]
    fn test_validate_summary() {
        colored::control::set_override(false);
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("contract.json");
        std::fs::write(&path, DEFINITION).unwrap();

        let summary = validate(&path).unwrap();
        assert!(summary.starts_with("Valid ContractReview"));
        assert!(summary.contains("Draft [initial]"));
        assert!(summary.contains("Signed [terminal]"));
        assert!(summary.contains("approve -> Signed (legal)"));
        assert!(summary.contains("submit -> Legal (anyone)"));
    }

    #[test]
    fn test_validate_rejects_bad_definition() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, DEFINITION.replace("\"initial\": true", "\"initial\": false"))
            .unwrap();
        assert!(validate(&path).is_err());
    }

    #[test]
    fn test_respond_all_answers_each_line() {
        let handler = handler();
        let mut decoder = LineDecoder::new();
        decoder.extend(b"{\"type\":\"request\",\"id\":\"1\",\"op\":\"PING\"}\n");
        decoder.extend(b"not json\n\n");
        decoder.extend(b"{\"type\":\"request\",\"id\":\"2\",\"op\":\"GET_DOCUMENT\",\"params\":{\"document_id\":\"doc-x\"}}\n");
        decoder.extend(b"{\"type\":\"request\",\"id\":\"3\"");

        let mut out = Vec::new();
        respond_all(&handler, &mut decoder, &mut out).unwrap();

        let responses = decode_all(&out);
        assert_eq!(responses.len(), 3);
        assert!(responses[0].is_ok());
        assert_eq!(responses[1].error_code(), Some(ErrorCode::BadRequest));
        assert_eq!(responses[1].id, "");
        assert_eq!(responses[2].id, "2");
        assert_eq!(responses[2].error_code(), Some(ErrorCode::DocumentNotFound));
        assert!(decoder.buffered() > 0);
    }

    #[test]
    fn test_call_surfaces_error_code() {
        let handler = handler();
        let err = call(
            &handler,
            Operation::GetWorkflow,
            json!({"workflow_id": "wf-missing"}),
        )
        .unwrap_err();
        assert!(err.to_string().starts_with("WORKFLOW_NOT_FOUND"));
    }

    #[test]
    fn test_parse_json_arg() {
        assert_eq!(parse_json_arg(r#"{"a": 1}"#).unwrap()["a"], 1);

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.json");
        std::fs::write(&path, r#"{"amount": 5}"#).unwrap();
        let arg = format!("@{}", path.display());
        assert_eq!(parse_json_arg(&arg).unwrap()["amount"], 5);
    }

    #[test]
    fn test_execute_one_shot_commands() {
        colored::control::set_override(false);
        let handler = handler();
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("contract.json");
        std::fs::write(&path, DEFINITION).unwrap();

        let created = execute(&handler, OneShot::CreateWorkflow { file: path }).unwrap();
        assert!(created.starts_with("Created workflow wf-"));
        let workflow = created
            .split_whitespace()
            .nth(2)
            .unwrap()
            .to_string();

        let doc = call(
            &handler,
            Operation::CreateDocument,
            json!({"workflow_id": workflow}),
        )
        .unwrap();
        let document = doc["id"].as_str().unwrap().to_string();

        let listed = execute(
            &handler,
            OneShot::AvailableEvents {
                document: document.clone(),
                roles: vec![],
            },
        )
        .unwrap();
        assert_eq!(listed, format!("{} in Draft: submit", document));

        let applied = execute(
            &handler,
            OneShot::ApplyEvent {
                document,
                event: "submit".to_string(),
                roles: vec![],
            },
        )
        .unwrap();
        assert!(applied.contains("State: Legal"));
        assert!(applied.contains("Due: "));
    }
}
