use actix_web::{web, HttpRequest, HttpResponse};
use arbiter::notifier::ReceiveRequest;
use arbiter::{ArbiterResponse, DepositLedger, ForcePayment, Mailbox, Signed};

use crate::metrics;
use crate::state::AppState;

/// Register every arbiter endpoint for ledger type `L`.
pub fn configure<L: DepositLedger + 'static>(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health::<L>))
        .route("/info", web::get().to(info::<L>))
        .route("/metrics", web::get().to(metrics_endpoint::<L>))
        .route("/force-payment", web::post().to(force_payment::<L>))
        .route("/receive", web::post().to(receive::<L>));
}

pub async fn health<L: DepositLedger + 'static>(state: web::Data<AppState<L>>) -> HttpResponse {
    match state.arbiter.health_check().await {
        Ok(height) => HttpResponse::Ok().json(serde_json::json!({
            "status": "ok",
            "service": "force-payment-arbiter",
            "ledgerHeight": height.to_string(),
            "notificationFailures": state.arbiter.notification_failures(),
        })),
        Err(_) => HttpResponse::ServiceUnavailable().json(serde_json::json!({
            "status": "degraded",
            "service": "force-payment-arbiter",
            "error": "ledger unreachable",
        })),
    }
}

pub async fn info<L: DepositLedger + 'static>(state: web::Data<AppState<L>>) -> HttpResponse {
    let config = state.arbiter.config();
    HttpResponse::Ok().json(serde_json::json!({
        "arbiter": state.arbiter.address(),
        "network": &config.network,
        "chainId": config.chain_id,
        "depositContract": config.deposit_contract,
        "eip712Domain": {
            "name": &config.eip712_domain_name,
            "version": &config.eip712_domain_version,
        },
        "paymentGracePeriodSecs": config.payment_grace_period_secs,
        "pendingPolicy": config.pending_policy,
    }))
}

pub async fn metrics_endpoint<L: DepositLedger + 'static>(
    req: HttpRequest,
    state: web::Data<AppState<L>>,
) -> HttpResponse {
    match &state.metrics_token {
        Some(token) => {
            let authorized = req
                .headers()
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.strip_prefix("Bearer "))
                .map(|t| arbiter::security::constant_time_eq(t.as_bytes(), token))
                .unwrap_or(false);

            if !authorized {
                return HttpResponse::Unauthorized().json(serde_json::json!({
                    "error": "unauthorized",
                    "message": "Valid Bearer token required for /metrics"
                }));
            }
        }
        None => {
            if !state.public_metrics {
                return HttpResponse::Forbidden().json(serde_json::json!({
                    "error": "forbidden",
                    "message": "Set METRICS_TOKEN or ARBITER_PUBLIC_METRICS=true to access /metrics"
                }));
            }
        }
    }
    HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(metrics::metrics_output())
}

/// Submit a signed force-payment batch. Every protocol outcome (refused,
/// rejected, committed) is a 200 with an arbiter-signed body. Infrastructure
/// failures are 503 when a resubmission is safe and 500 otherwise.
pub async fn force_payment<L: DepositLedger + 'static>(
    state: web::Data<AppState<L>>,
    body: web::Bytes,
) -> HttpResponse {
    let request: Signed<ForcePayment> = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(_) => {
            metrics::FORCE_PAYMENT_REQUESTS
                .with_label_values(&["malformed"])
                .inc();
            return HttpResponse::BadRequest().json(serde_json::json!({
                "error": "invalid request body",
            }));
        }
    };

    let start = std::time::Instant::now();
    let result = state.arbiter.handle(&request, arbiter::unix_now()).await;
    let elapsed = start.elapsed().as_secs_f64();

    match result {
        Ok(response) => {
            let label = match &response.payload {
                ArbiterResponse::ServiceRefused(_) => "refused",
                ArbiterResponse::ForcePaymentRejected(_) => "rejected",
                ArbiterResponse::ForcePaymentCommitted(c) => {
                    metrics::AMOUNT_PAID.inc_by(u64::try_from(c.amount_paid).unwrap_or(u64::MAX));
                    "settled"
                }
            };
            metrics::FORCE_PAYMENT_REQUESTS
                .with_label_values(&[label])
                .inc();
            metrics::SETTLE_LATENCY
                .with_label_values(&[label])
                .observe(elapsed);
            tracing::info!(
                provider = %request.signer,
                claims = request.payload.acceptances.len(),
                outcome = label,
                "force payment handled"
            );
            HttpResponse::Ok().json(response)
        }
        Err(e) => {
            metrics::FORCE_PAYMENT_REQUESTS
                .with_label_values(&["error"])
                .inc();
            metrics::SETTLE_LATENCY
                .with_label_values(&["error"])
                .observe(elapsed);
            tracing::error!(error = %e, retryable = e.is_retryable(), "force payment internal error");
            if e.is_retryable() {
                HttpResponse::ServiceUnavailable().json(serde_json::json!({
                    "error": "temporarily unavailable",
                    "retryable": true,
                }))
            } else {
                HttpResponse::InternalServerError().json(serde_json::json!({
                    "error": "force payment failed",
                    "retryable": false,
                }))
            }
        }
    }
}

/// Collect queued messages. The body is a `ReceiveRequest` signed by the
/// recipient within the last few minutes.
pub async fn receive<L: DepositLedger + 'static>(
    state: web::Data<AppState<L>>,
    body: web::Bytes,
) -> HttpResponse {
    let request: Signed<ReceiveRequest> = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(_) => {
            return HttpResponse::BadRequest().json(serde_json::json!({
                "error": "invalid request body",
            }));
        }
    };

    if !Mailbox::authorize(&request, arbiter::unix_now(), state.arbiter.config()) {
        tracing::warn!(recipient = %request.payload.recipient, "mailbox pickup refused");
        return HttpResponse::Unauthorized().json(serde_json::json!({
            "error": "authentication failed",
        }));
    }

    let messages = state.mailbox.drain(request.payload.recipient);
    HttpResponse::Ok().json(serde_json::json!({
        "recipient": request.payload.recipient,
        "messages": messages,
    }))
}
