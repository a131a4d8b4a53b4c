//! In-memory BaaS backend for tests.
//!
//! Implements every BaaS trait over plain maps so services and the web tier
//! can run without a network. Filtering follows `PostgREST` equality
//! semantics on the string form of each column. Failures and latency can be
//! injected per table or function.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rural_grow_core::{Email, Role, UserId};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};
use uuid::Uuid;

use super::{
    AccessToken, AuthApi, AuthSession, BaasError, DataApi, FunctionsApi, Identity, Order, Query,
    SignUp, StorageApi,
};

/// Lifetime of issued access tokens.
const TOKEN_TTL_SECS: i64 = 3600;

/// Fixed origin for generated `created_at` values, so row order is stable.
const CLOCK_ORIGIN: i64 = 1_735_689_600;

#[derive(Debug, Clone)]
struct MemoryUser {
    id: UserId,
    password: String,
}

#[derive(Debug, Default)]
struct State {
    users: HashMap<String, MemoryUser>,
    access_tokens: HashMap<String, UserId>,
    refresh_tokens: HashMap<String, UserId>,
    tables: HashMap<String, Vec<Value>>,
    objects: HashMap<(String, String), (Vec<u8>, String)>,
    calls: Vec<(String, Value)>,
    checkout_sessions: HashMap<String, (f64, String)>,
    notification_keys: HashSet<String>,
    failing_tables: HashMap<String, u32>,
    failing_functions: HashMap<String, u32>,
    delays: HashMap<String, Duration>,
    clock: i64,
}

impl State {
    fn tick(&mut self) -> String {
        self.clock += 1;
        DateTime::<Utc>::from_timestamp(CLOCK_ORIGIN + self.clock, 0)
            .unwrap_or_default()
            .to_rfc3339()
    }

    fn issue_session(&mut self, user: &MemoryUser, email: &Email) -> AuthSession {
        let access = Uuid::new_v4().to_string();
        let refresh = Uuid::new_v4().to_string();
        self.access_tokens.insert(access.clone(), user.id);
        self.refresh_tokens.insert(refresh.clone(), user.id);
        AuthSession {
            access_token: AccessToken::new(access),
            refresh_token: SecretString::from(refresh),
            expires_at: Utc::now() + chrono::Duration::seconds(TOKEN_TTL_SECS),
            user: Identity {
                id: user.id,
                email: email.clone(),
            },
        }
    }

    fn email_of(&self, id: UserId) -> Option<Email> {
        self.users
            .iter()
            .find(|(_, user)| user.id == id)
            .and_then(|(email, _)| Email::parse(email).ok())
    }

    /// Consume one injected failure for `key`, if any remain.
    fn take_failure(counters: &mut HashMap<String, u32>, key: &str) -> bool {
        match counters.get_mut(key) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        }
    }

    fn insert_row(&mut self, table: &str, mut row: Value) -> Value {
        if let Value::Object(fields) = &mut row {
            fields
                .entry("id")
                .or_insert_with(|| Value::String(Uuid::new_v4().to_string()));
            if !fields.contains_key("created_at") {
                let now = self.tick();
                fields.insert("created_at".to_owned(), Value::String(now));
            }
        }
        self.tables
            .entry(table.to_owned())
            .or_default()
            .push(row.clone());
        row
    }
}

fn unavailable(what: &str) -> BaasError {
    BaasError::Api {
        status: 503,
        code: None,
        message: format!("{what} unavailable"),
    }
}

fn column_text(row: &Value, column: &str) -> Option<String> {
    match row.get(column)? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn row_matches(row: &Value, query: &Query) -> bool {
    query
        .filters()
        .iter()
        .all(|f| column_text(row, &f.column).as_deref() == Some(f.value.as_str()))
}

/// In-memory implementation of every BaaS capability.
///
/// Clones share state, so a test can keep one handle for assertions while the
/// services own another.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    state: Arc<Mutex<State>>,
}

impl MemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // A panicking test thread must not wedge every other assertion
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Register an auth user without profile or role rows.
    ///
    /// # Panics
    ///
    /// Panics if `email` is not a valid address.
    #[allow(clippy::unwrap_used)]
    pub fn add_user(&self, email: &str, password: &str) -> UserId {
        let email = Email::parse(email).unwrap();
        let id = UserId::generate();
        self.lock().users.insert(
            email.as_str().to_owned(),
            MemoryUser {
                id,
                password: password.to_owned(),
            },
        );
        id
    }

    /// Register a user with a profile row and, if given, a role assignment.
    pub fn add_user_with_role(&self, email: &str, password: &str, role: Option<Role>) -> UserId {
        let id = self.add_user(email, password);
        self.insert_row(
            "profiles",
            json!({ "user_id": id, "email": email.trim().to_lowercase() }),
        );
        if let Some(role) = role {
            self.grant_role(id, role);
        }
        id
    }

    /// Append a `user_roles` row.
    pub fn grant_role(&self, user: UserId, role: Role) {
        self.insert_row("user_roles", json!({ "user_id": user, "role": role }));
    }

    /// Insert a row directly, filling `id` and `created_at` when absent.
    pub fn insert_row(&self, table: &str, row: Value) -> Value {
        self.lock().insert_row(table, row)
    }

    /// All rows of a table, in insertion order.
    #[must_use]
    pub fn rows(&self, table: &str) -> Vec<Value> {
        self.lock().tables.get(table).cloned().unwrap_or_default()
    }

    /// Fail the next `times` calls touching `table` (or calling the database
    /// function of that name) with a 503.
    pub fn fail_table(&self, table: &str, times: u32) {
        self.lock().failing_tables.insert(table.to_owned(), times);
    }

    /// Fail the next `times` invocations of `function` with a 503.
    pub fn fail_function(&self, function: &str, times: u32) {
        self.lock()
            .failing_functions
            .insert(function.to_owned(), times);
    }

    /// Delay every select on `table`.
    pub fn delay_table(&self, table: &str, delay: Duration) {
        self.lock().delays.insert(table.to_owned(), delay);
    }

    /// Bodies of every invocation of `function`, oldest first.
    #[must_use]
    pub fn function_calls(&self, function: &str) -> Vec<Value> {
        self.lock()
            .calls
            .iter()
            .filter(|(name, _)| name == function)
            .map(|(_, body)| body.clone())
            .collect()
    }

    /// Set the payment status `verify-payment` reports for a checkout session.
    pub fn set_payment_status(&self, session_id: &str, status: &str) {
        if let Some(session) = self.lock().checkout_sessions.get_mut(session_id) {
            session.1 = status.to_owned();
        }
    }

    /// Stored object bytes, if uploaded.
    #[must_use]
    pub fn object(&self, bucket: &str, path: &str) -> Option<Vec<u8>> {
        self.lock()
            .objects
            .get(&(bucket.to_owned(), path.to_owned()))
            .map(|(bytes, _)| bytes.clone())
    }

    fn check_table(&self, table: &str) -> Result<(), BaasError> {
        let mut state = self.lock();
        if State::take_failure(&mut state.failing_tables, table) {
            return Err(unavailable(table));
        }
        Ok(())
    }

    fn embed_products(state: &State, mut row: Value) -> Value {
        let product = column_text(&row, "product_id").and_then(|id| {
            state
                .tables
                .get("products")?
                .iter()
                .find(|p| column_text(p, "id").as_deref() == Some(id.as_str()))
                .cloned()
        });
        if let (Value::Object(fields), Some(product)) = (&mut row, product) {
            fields.insert("products".to_owned(), product);
        }
        row
    }

    /// Earnings of a farmer: delivered orders are earned, orders still moving
    /// are pending, and payout requests that were not denied are withdrawn.
    fn farmer_earnings(state: &State, args: &Value) -> Value {
        let farmer = args.get("farmer_id").and_then(Value::as_str).unwrap_or_default();
        let amount = |row: &Value, column: &str| row.get(column).and_then(Value::as_f64).unwrap_or(0.0);
        let owned = |table: &str| -> Vec<&Value> {
            state
                .tables
                .get(table)
                .map(|rows| {
                    rows.iter()
                        .filter(|row| column_text(row, "farmer_id").as_deref() == Some(farmer))
                        .collect()
                })
                .unwrap_or_default()
        };

        let orders = owned("orders");
        let sum_orders = |statuses: &[&str]| -> f64 {
            orders
                .iter()
                .filter(|o| {
                    column_text(o, "status").is_some_and(|s| statuses.contains(&s.as_str()))
                })
                .map(|o| amount(o, "total_price"))
                .sum()
        };
        let total = sum_orders(&["delivered"]);
        let pending = sum_orders(&["accepted", "processing", "shipped"]);
        let withdrawn: f64 = owned("payout_requests")
            .iter()
            .filter(|p| column_text(p, "status").as_deref() != Some("denied"))
            .map(|p| amount(p, "amount"))
            .sum();

        json!({
            "total_earnings": total,
            "available_balance": total - withdrawn,
            "pending_balance": pending,
        })
    }

    fn create_checkout(state: &mut State, body: &Value) -> Value {
        let total: f64 = body
            .get("items")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .map(|item| {
                        let price = item.get("price").and_then(Value::as_f64).unwrap_or(0.0);
                        let quantity = item.get("quantity").and_then(Value::as_f64).unwrap_or(0.0);
                        price * quantity
                    })
                    .sum()
            })
            .unwrap_or(0.0);
        let session_id = format!("cs_test_{}", state.checkout_sessions.len() + 1);
        state
            .checkout_sessions
            .insert(session_id.clone(), (total, "paid".to_owned()));
        json!({
            "sessionId": session_id,
            "url": format!("https://checkout.example.test/pay/{session_id}"),
        })
    }

    fn verify_payment(state: &State, body: &Value) -> Value {
        let session = body
            .get("sessionId")
            .and_then(Value::as_str)
            .and_then(|id| state.checkout_sessions.get(id));
        match session {
            Some((amount, status)) if status == "paid" => {
                json!({ "success": true, "status": "paid", "amount": amount })
            }
            Some((_, status)) => json!({ "success": false, "status": status }),
            None => json!({ "error": "No such checkout session" }),
        }
    }

    fn create_notification(state: &mut State, body: &Value) -> Value {
        let field = |name: &str| body.get(name).and_then(Value::as_str).map(str::to_owned);
        let (Some(user_id), Some(title), Some(message)) =
            (field("userId"), field("title"), field("message"))
        else {
            return json!({ "error": "Missing required fields: userId, title, message" });
        };

        if let Some(key) = field("idempotencyKey") {
            if !state.notification_keys.insert(key) {
                return json!({ "notification": null, "duplicate": true });
            }
        }

        let row = state.insert_row(
            "user_notifications",
            json!({
                "user_id": user_id,
                "title": title,
                "message": message,
                "type": field("type").unwrap_or_else(|| "system".to_owned()),
                "related_id": field("relatedId"),
                "is_read": false,
            }),
        );
        json!({ "notification": row })
    }
}

#[async_trait]
impl AuthApi for MemoryBackend {
    async fn sign_in_with_password(
        &self,
        email: &Email,
        password: &SecretString,
    ) -> Result<AuthSession, BaasError> {
        let mut state = self.lock();
        let user = state
            .users
            .get(email.as_str())
            .filter(|user| user.password == password.expose_secret())
            .cloned()
            .ok_or(BaasError::InvalidCredentials)?;
        Ok(state.issue_session(&user, email))
    }

    async fn sign_up(
        &self,
        email: &Email,
        password: &SecretString,
        _metadata: Value,
    ) -> Result<SignUp, BaasError> {
        let mut state = self.lock();
        if state.users.contains_key(email.as_str()) {
            return Err(BaasError::Api {
                status: 422,
                code: Some("user_already_exists".to_owned()),
                message: "User already registered".to_owned(),
            });
        }
        let user = MemoryUser {
            id: UserId::generate(),
            password: password.expose_secret().to_owned(),
        };
        state.users.insert(email.as_str().to_owned(), user.clone());
        let session = state.issue_session(&user, email);
        Ok(SignUp {
            user: session.user.clone(),
            session: Some(session),
        })
    }

    async fn refresh_session(
        &self,
        refresh_token: &SecretString,
    ) -> Result<AuthSession, BaasError> {
        let mut state = self.lock();
        let id = state
            .refresh_tokens
            .remove(refresh_token.expose_secret())
            .ok_or(BaasError::SessionExpired)?;
        let email = state.email_of(id).ok_or(BaasError::SessionExpired)?;
        let user = state
            .users
            .get(email.as_str())
            .cloned()
            .ok_or(BaasError::SessionExpired)?;
        Ok(state.issue_session(&user, &email))
    }

    async fn get_user(&self, token: &AccessToken) -> Result<Identity, BaasError> {
        let state = self.lock();
        let id = *state
            .access_tokens
            .get(token.expose())
            .ok_or(BaasError::SessionExpired)?;
        let email = state.email_of(id).ok_or(BaasError::SessionExpired)?;
        Ok(Identity { id, email })
    }

    async fn sign_out(&self, token: &AccessToken) -> Result<(), BaasError> {
        let mut state = self.lock();
        if let Some(id) = state.access_tokens.remove(token.expose()) {
            state.refresh_tokens.retain(|_, owner| *owner != id);
        }
        Ok(())
    }
}

#[async_trait]
impl DataApi for MemoryBackend {
    async fn select(
        &self,
        query: &Query,
        _token: Option<&AccessToken>,
    ) -> Result<Vec<Value>, BaasError> {
        let delay = self.lock().delays.get(query.table_name()).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.check_table(query.table_name())?;

        let state = self.lock();
        let mut rows: Vec<Value> = state
            .tables
            .get(query.table_name())
            .map(|rows| rows.iter().filter(|row| row_matches(row, query)).cloned().collect())
            .unwrap_or_default();

        if let Some((column, order)) = query.ordering() {
            rows.sort_by(|a, b| {
                let ordering = column_text(a, column).cmp(&column_text(b, column));
                match order {
                    Order::Asc => ordering,
                    Order::Desc => ordering.reverse(),
                }
            });
        }
        if let Some(limit) = query.row_limit() {
            rows.truncate(limit);
        }

        let embeds_products = query
            .to_pairs(true)
            .first()
            .is_some_and(|(_, select)| select.contains("products("));
        if embeds_products {
            rows = rows
                .into_iter()
                .map(|row| Self::embed_products(&state, row))
                .collect();
        }
        Ok(rows)
    }

    async fn insert(
        &self,
        table: &str,
        rows: Vec<Value>,
        _token: Option<&AccessToken>,
    ) -> Result<Vec<Value>, BaasError> {
        self.check_table(table)?;
        let mut state = self.lock();
        Ok(rows
            .into_iter()
            .map(|row| state.insert_row(table, row))
            .collect())
    }

    async fn update(
        &self,
        query: &Query,
        patch: Value,
        _token: Option<&AccessToken>,
    ) -> Result<Vec<Value>, BaasError> {
        self.check_table(query.table_name())?;
        let mut state = self.lock();
        let Some(rows) = state.tables.get_mut(query.table_name()) else {
            return Ok(Vec::new());
        };
        let mut updated = Vec::new();
        for row in rows.iter_mut().filter(|row| row_matches(row, query)) {
            if let (Value::Object(fields), Value::Object(changes)) = (&mut *row, &patch) {
                for (key, value) in changes {
                    fields.insert(key.clone(), value.clone());
                }
            }
            updated.push(row.clone());
        }
        Ok(updated)
    }

    async fn delete(&self, query: &Query, _token: Option<&AccessToken>) -> Result<(), BaasError> {
        self.check_table(query.table_name())?;
        if let Some(rows) = self.lock().tables.get_mut(query.table_name()) {
            rows.retain(|row| !row_matches(row, query));
        }
        Ok(())
    }

    async fn rpc(
        &self,
        function: &str,
        args: Value,
        _token: Option<&AccessToken>,
    ) -> Result<Value, BaasError> {
        self.check_table(function)?;
        let state = self.lock();
        match function {
            "get_farmer_earnings" => Ok(Self::farmer_earnings(&state, &args)),
            other => Err(BaasError::Api {
                status: 404,
                code: Some("PGRST202".to_owned()),
                message: format!("Could not find the function public.{other}"),
            }),
        }
    }
}

#[async_trait]
impl FunctionsApi for MemoryBackend {
    async fn invoke(
        &self,
        name: &str,
        body: Value,
        _token: Option<&AccessToken>,
    ) -> Result<Value, BaasError> {
        let mut state = self.lock();
        state.calls.push((name.to_owned(), body.clone()));
        if State::take_failure(&mut state.failing_functions, name) {
            return Err(unavailable(name));
        }

        let response = match name {
            "create-checkout" => Self::create_checkout(&mut state, &body),
            "verify-payment" => Self::verify_payment(&state, &body),
            "create-notification" => Self::create_notification(&mut state, &body),
            other => {
                return Err(BaasError::Api {
                    status: 404,
                    code: None,
                    message: format!("function {other} not found"),
                });
            }
        };

        if let Some(message) = super::function_error(&response) {
            return Err(BaasError::Api {
                status: 400,
                code: None,
                message,
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl StorageApi for MemoryBackend {
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
        _token: Option<&AccessToken>,
    ) -> Result<(), BaasError> {
        self.lock().objects.insert(
            (bucket.to_owned(), path.to_owned()),
            (bytes, content_type.to_owned()),
        );
        Ok(())
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!("https://baas.example.test/storage/v1/object/public/{bucket}/{path}")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    fn email(s: &str) -> Email {
        Email::parse(s).unwrap()
    }

    #[tokio::test]
    async fn test_sign_in_checks_password() {
        let backend = MemoryBackend::new();
        backend.add_user("amina@farm.test", "correct horse");

        let wrong = backend
            .sign_in_with_password(&email("amina@farm.test"), &SecretString::from("nope"))
            .await;
        assert!(matches!(wrong, Err(BaasError::InvalidCredentials)));

        let session = backend
            .sign_in_with_password(
                &email("amina@farm.test"),
                &SecretString::from("correct horse"),
            )
            .await
            .unwrap();
        let identity = backend.get_user(&session.access_token).await.unwrap();
        assert_eq!(identity, session.user);
    }

    #[tokio::test]
    async fn test_select_filters_orders_and_limits() {
        let backend = MemoryBackend::new();
        let user = UserId::generate();
        backend.grant_role(user, Role::Seller);
        backend.grant_role(user, Role::Farmer);
        backend.grant_role(UserId::generate(), Role::Admin);

        let query = Query::table("user_roles")
            .eq("user_id", user)
            .order("created_at", Order::Desc)
            .limit(1);
        let rows = backend.select(&query, None).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["role"], "farmer");
    }

    #[tokio::test]
    async fn test_injected_failures_are_consumed() {
        let backend = MemoryBackend::new();
        backend.fail_table("wishlist", 1);
        let query = Query::table("wishlist");
        assert!(backend.select(&query, None).await.unwrap_err().is_transient());
        assert!(backend.select(&query, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_notifications_deduplicate_by_key() {
        let backend = MemoryBackend::new();
        let body = json!({
            "userId": "u1",
            "title": "New purchase request",
            "message": "hi",
            "type": "request",
            "idempotencyKey": "request:cs_1:u1",
        });
        backend
            .invoke("create-notification", body.clone(), None)
            .await
            .unwrap();
        backend
            .invoke("create-notification", body, None)
            .await
            .unwrap();
        assert_eq!(backend.rows("user_notifications").len(), 1);
        assert_eq!(backend.function_calls("create-notification").len(), 2);
    }

    #[tokio::test]
    async fn test_error_body_becomes_api_error() {
        let backend = MemoryBackend::new();
        let err = backend
            .invoke("verify-payment", json!({ "sessionId": "cs_missing" }), None)
            .await
            .unwrap_err();
        assert!(matches!(err, BaasError::Api { status: 400, .. }));
    }
}
