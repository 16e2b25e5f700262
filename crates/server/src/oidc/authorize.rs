//! Authorization endpoint: the authorization-code protocol state machine.
//!
//! Until the redirect URI has been validated against the client's allow-list,
//! errors are rendered to the caller; from that point on they are reported by
//! redirecting to the now-trusted URI with `error`/`error_description` query
//! parameters, so no detail leaks through a page the client never asked for.

use axum::{
    Form,
    extract::{Query, State},
    http::{HeaderMap, StatusCode, Uri, header},
    response::{Html, IntoResponse, Response},
};
use sea_orm::{ActiveModelTrait, ActiveValue::Set, EntityTrait};
use serde::Deserialize;
use time::OffsetDateTime;
use utoipa::ToSchema;

use crate::AppState;
use crate::cache::AuthzCode;
use crate::entity::{authz_history, client};
use crate::extract::AuthSession;
use crate::oidc::claims::{SCOPE_OPENID, SCOPE_PROFILE};
use crate::oidc::{OIDC_TAG, bad_request, found, internal_error, render_error};
use crate::util::{Fingerprint, normalize_redirect_uri, random_opaque};

/// Length of authorization code strings.
const CODE_LEN: usize = 13;

#[derive(Debug, Deserialize, ToSchema)]
pub struct AuthorizeQuery {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub response_type: String,
    #[serde(default)]
    pub scope: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub redirect_uri: String,
    pub id_token_signed_response_alg: Option<String>,
}

/// OAuth2 / OIDC authorization endpoint.
#[tracing::instrument(skip(state, auth, headers), fields(client_id = %params.client_id))]
#[utoipa::path(
    get,
    path = "/authorize",
    tag = OIDC_TAG,
    operation_id = "Authorize",
    summary = "Start the authorization-code flow",
    description = "Validates the client, redirect URI and requested scopes, then either issues an \
                   authorization code directly (consent on file) or renders the consent prompt. \
                   Requires an active session; unauthenticated browsers are redirected to the \
                   login page.",
    params(
        ("client_id" = String, Query, description = "Registered client identifier."),
        ("response_type" = String, Query, description = "Must be `code`."),
        ("scope" = String, Query, description = "Space-separated scopes; must include `openid`, may include `profile`."),
        ("state" = Option<String>, Query, description = "Opaque CSRF value, echoed back verbatim."),
        ("redirect_uri" = Option<String>, Query, description = "Must exactly match a registered callback URL; defaults to the first registered one."),
        ("id_token_signed_response_alg" = Option<String>, Query, description = "Requested ID token algorithm; only `EdDSA` is supported."),
    ),
    responses(
        (status = 302, description = "Redirect to the relying party with a code, or with an OAuth2 error"),
        (status = 200, description = "Consent prompt HTML"),
        (status = 400, description = "Unknown client or unauthorized redirect URI", body = super::ErrorResponse),
    )
)]
pub async fn authorize(
    State(state): State<AppState>,
    auth: AuthSession,
    headers: HeaderMap,
    uri: Uri,
    Query(params): Query<AuthorizeQuery>,
) -> Response {
    // Unknown client: terminal, rendered to the caller - there is no trusted
    // redirect URI to use yet.
    let client = match client::Entity::find_by_id(&params.client_id)
        .one(state.db.as_ref())
        .await
    {
        Ok(Some(c)) => c,
        Ok(None) => return bad_request("invalid_client", "invalid client id"),
        Err(e) => {
            tracing::error!("Failed to read client from store: {e}");
            return internal_error();
        }
    };

    let normalized = normalize_redirect_uri(&params.redirect_uri);
    let Some(redirect_to) = client.resolve_callback_url(&normalized) else {
        return bad_request("invalid_request", "unauthorized redirect URI");
    };

    // The redirect URI is trusted from here on; all further errors go back to
    // the relying party.
    if params.response_type != "code" {
        return error_redirect(
            &redirect_to,
            &params.state,
            "unsupported_response_type",
            "response type not supported",
        );
    }

    if let Some(alg) = params.id_token_signed_response_alg.as_deref()
        && !alg.is_empty()
        && alg != "EdDSA"
    {
        return error_redirect(
            &redirect_to,
            &params.state,
            "invalid_request",
            "unsupported id_token signing algorithm",
        );
    }

    let scopes = match validate_scopes(&params.scope) {
        Ok(s) => s,
        Err(desc) => {
            return error_redirect(&redirect_to, &params.state, "invalid_scope", desc);
        }
    };

    // Prior consent on file means no prompt: straight to code issuance.
    let consented = match authz_history::Entity::find_by_id((
        auth.user.id.clone(),
        client.id.clone(),
    ))
    .one(state.db.as_ref())
    .await
    {
        Ok(record) => record.is_some(),
        Err(e) => {
            tracing::error!("Failed to read consent history: {e}");
            return error_redirect(
                &redirect_to,
                &params.state,
                "server_error",
                "database operation failed",
            );
        }
    };

    if !consented {
        let return_to = uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/authorize");
        return consent_page(&auth, &client, &scopes, &redirect_to, return_to);
    }

    issue_code(
        &state,
        &redirect_to,
        &auth.user.id,
        &client.id,
        scopes,
        &params.state,
        &headers,
    )
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ConsentForm {
    /// `granted` to approve; anything else is a denial.
    #[serde(default)]
    pub consent: String,
    /// The validated redirect URI the flow will return to.
    #[serde(default)]
    pub callback: String,
    /// The original authorize request URI, used to recover scope and state.
    #[serde(default)]
    pub return_to: String,
    #[serde(default)]
    pub client_id: String,
}

/// Consent submission: the second leg of the authorization endpoint.
#[tracing::instrument(skip(state, auth, headers, form), fields(client_id = %form.client_id))]
#[utoipa::path(
    post,
    path = "/authorize",
    tag = OIDC_TAG,
    operation_id = "Submit Consent",
    summary = "Approve or deny an authorization request",
    request_body(
        content = ConsentForm,
        content_type = "application/x-www-form-urlencoded",
        description = "Consent decision plus the flow context carried through the form"
    ),
    responses(
        (status = 302, description = "Redirect to the relying party with a code, or with `access_denied`"),
        (status = 200, description = "Error page HTML when the form context is invalid"),
    )
)]
pub async fn consent(
    State(state): State<AppState>,
    auth: AuthSession,
    headers: HeaderMap,
    Form(form): Form<ConsentForm>,
) -> Response {
    let client = match client::Entity::find_by_id(&form.client_id)
        .one(state.db.as_ref())
        .await
    {
        Ok(Some(c)) => c,
        Ok(None) => return render_error("Invalid client id", StatusCode::BAD_REQUEST),
        Err(e) => {
            tracing::error!("Failed to read client from store: {e}");
            return render_error("Database operation failed", StatusCode::INTERNAL_SERVER_ERROR);
        }
    };

    // Re-validate the callback: it round-tripped through the browser.
    let normalized = normalize_redirect_uri(&form.callback);
    let Some(redirect_to) = client.resolve_callback_url(&normalized) else {
        return render_error("Unauthorized redirect URI", StatusCode::BAD_REQUEST);
    };

    let request_state = query_param(&form.return_to, "state").unwrap_or_default();

    if form.consent != "granted" {
        return error_redirect(
            &redirect_to,
            &request_state,
            "access_denied",
            "user denied the request",
        );
    }

    let scope = query_param(&form.return_to, "scope").unwrap_or_default();
    let scopes = match validate_scopes(&scope) {
        Ok(s) => s,
        Err(desc) => {
            return error_redirect(&redirect_to, &request_state, "invalid_scope", desc);
        }
    };

    let history = authz_history::ActiveModel {
        user_id: Set(auth.user.id.clone()),
        client_id: Set(client.id.clone()),
        created_at: Set(OffsetDateTime::now_utc()),
    };
    match authz_history::Entity::find_by_id((auth.user.id.clone(), client.id.clone()))
        .one(state.db.as_ref())
        .await
    {
        Ok(Some(_)) => {}
        Ok(None) => {
            if let Err(e) = history.insert(state.db.as_ref()).await {
                tracing::error!("Failed to record consent: {e}");
                return error_redirect(
                    &redirect_to,
                    &request_state,
                    "server_error",
                    "database operation failed",
                );
            }
            tracing::info!(user_id = %auth.user.id, client_id = %client.id, "User granted consent");
        }
        Err(e) => {
            tracing::error!("Failed to read consent history: {e}");
            return error_redirect(
                &redirect_to,
                &request_state,
                "server_error",
                "database operation failed",
            );
        }
    }

    issue_code(
        &state,
        &redirect_to,
        &auth.user.id,
        &client.id,
        scopes,
        &request_state,
        &headers,
    )
}

/// Scope policy: `openid` is required, `profile` may be added, anything else
/// is rejected.
fn validate_scopes(scope: &str) -> Result<Vec<String>, &'static str> {
    let scopes: Vec<String> = scope.split_whitespace().map(String::from).collect();
    if scopes.is_empty() {
        return Err("missing scope");
    }
    if !scopes.iter().any(|s| s == SCOPE_OPENID) {
        return Err("openid scope is required");
    }
    if scopes
        .iter()
        .any(|s| s != SCOPE_OPENID && s != SCOPE_PROFILE)
    {
        return Err("unsupported scope");
    }
    Ok(scopes)
}

/// Step 8 of the flow: mint the single-use code, bind it to the request
/// context and send the browser back to the relying party.
fn issue_code(
    state: &AppState,
    redirect_to: &str,
    user_id: &str,
    client_id: &str,
    scopes: Vec<String>,
    request_state: &str,
    headers: &HeaderMap,
) -> Response {
    let fingerprint = fingerprint_from_headers(headers);
    let code = random_opaque(CODE_LEN);
    state.codes.put(
        code.clone(),
        AuthzCode {
            client_id: client_id.to_string(),
            user_id: user_id.to_string(),
            scopes,
            browser: fingerprint.browser,
            os: fingerprint.os,
        },
    );

    tracing::info!(client_id, "Issued authorization code");
    found(&format!(
        "{}?code={}&state={}",
        redirect_to,
        urlencoding::encode(&code),
        urlencoding::encode(request_state),
    ))
}

pub(crate) fn fingerprint_from_headers(headers: &HeaderMap) -> Fingerprint {
    headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(Fingerprint::from_user_agent)
        .unwrap_or_default()
}

/// Report a protocol error on the trusted redirect URI, echoing `state`.
fn error_redirect(redirect_to: &str, request_state: &str, error: &str, description: &str) -> Response {
    let mut url = match url::Url::parse(redirect_to) {
        Ok(u) => u,
        // A registered callback that does not parse is an operator problem,
        // not something to bounce the browser at.
        Err(_) => return bad_request(error, description),
    };
    url.query_pairs_mut()
        .append_pair("error", error)
        .append_pair("error_description", description);
    if !request_state.is_empty() {
        url.query_pairs_mut().append_pair("state", request_state);
    }
    found(url.as_str())
}

/// Pull a single query parameter out of a request URI string.
fn query_param(uri: &str, key: &str) -> Option<String> {
    let (_, query) = uri.split_once('?')?;
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}

fn consent_page(
    auth: &AuthSession,
    client: &client::Model,
    scopes: &[String],
    redirect_to: &str,
    return_to: &str,
) -> Response {
    let scope_items: String = scopes
        .iter()
        .map(|s| format!("<li>{}</li>", scope_description(s)))
        .collect();
    let html = format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="utf-8">
    <meta name="viewport" content="width=device-width, initial-scale=1">
    <title>Authorize {client_name} - Signet</title>
</head>
<body>
    <main>
        <h1>Authorize {client_name}</h1>
        <p>Signed in as <strong>{email}</strong>.</p>
        <p><strong>{client_name}</strong> is requesting access to:</p>
        <ul>{scope_items}</ul>
        <form method="post" action="/authorize">
            <input type="hidden" name="callback" value="{callback}">
            <input type="hidden" name="return_to" value="{return_to}">
            <input type="hidden" name="client_id" value="{client_id}">
            <button type="submit" name="consent" value="granted">Allow</button>
            <button type="submit" name="consent" value="denied">Deny</button>
        </form>
    </main>
</body>
</html>"#,
        client_name = escape_html(&client.name),
        email = escape_html(&auth.user.email),
        callback = escape_html(redirect_to),
        return_to = escape_html(return_to),
        client_id = escape_html(&client.id),
    );
    Html(html).into_response()
}

fn scope_description(scope: &str) -> &'static str {
    match scope {
        SCOPE_OPENID => "Verify your identity",
        SCOPE_PROFILE => "Access your email address and avatar",
        _ => "Unknown permission",
    }
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
