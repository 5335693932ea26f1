use goose::prelude::*;
use serde_json::{Value, json};
use std::env;

fn recipient() -> String {
    env::var("LOADTEST_RECIPIENT").unwrap_or_else(|_| "loadtest@example.com".to_string())
}

async fn health_check(user: &mut GooseUser) -> TransactionResult {
    let _goose_metrics = user.get("/healthz").await?;
    Ok(())
}

/// Queue a request, then poll its status once with the returned id.
async fn submit_and_poll(user: &mut GooseUser) -> TransactionResult {
    let body = json!({
        "to": recipient(),
        "subject": "Load test",
        "message": "Sent by the mail relay load test",
        "html": false,
        "requestId": "loadtest",
    });
    let goose_metrics = user.post_json("/api/email/requests", &body).await?;

    let id = match goose_metrics.response {
        Ok(response) => response
            .json::<Value>()
            .await
            .ok()
            .and_then(|v| v.get("id").and_then(Value::as_str).map(str::to_string)),
        Err(_) => None,
    };
    if let Some(id) = id {
        let path = format!("/api/email/delivery?emailId={id}");
        let _goose_metrics = user.get(&path).await?;
    }
    Ok(())
}

async fn submit_direct(user: &mut GooseUser) -> TransactionResult {
    let body = json!({
        "to": recipient(),
        "message": "Direct load test message",
    });
    let _goose_metrics = user.post_json("/api/email/direct-requests", &body).await?;
    Ok(())
}

async fn poll_unknown(user: &mut GooseUser) -> TransactionResult {
    let _goose_metrics = user.get("/api/email/delivery?emailId=does-not-exist").await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), GooseError> {
    println!("Recipient for queued requests: {}", recipient());
    println!("Run the relay with smtp.dry_run = true unless you mean to send real mail");

    GooseAttack::initialize()?
        .register_scenario(
            scenario!("HealthCheck").register_transaction(transaction!(health_check)),
        )
        .register_scenario(
            scenario!("Intake")
                .register_transaction(transaction!(submit_and_poll).set_weight(3)?)
                .register_transaction(transaction!(submit_direct)),
        )
        .register_scenario(
            scenario!("Polling").register_transaction(transaction!(poll_unknown)),
        )
        .execute()
        .await?;

    Ok(())
}
