//! QR login, session restore and the small admin commands around them.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use log::{debug, info, warn};
use rand::RngCore;
use serde_json::{json, Value};

use super::{Conn, ConnError, CHALLENGE_TAG, LOGIN_TAG};
use crate::crypto::KeyPair;
use crate::protocol::qr::QrPayload;
use crate::protocol::ReplyError;
use crate::session::{answer_challenge, derive_keys, Info, LoginError, Session, SessionKeys};

impl Conn {
    /// Create a new session by QR scan.
    ///
    /// `on_qr` receives the payload to show the user. The call returns once
    /// the phone has scanned it and the keys are derived, or fails when the
    /// code expires. Connects first if needed.
    pub async fn login<F>(self: &Arc<Self>, on_qr: F) -> Result<Session, ConnError>
    where
        F: FnOnce(QrPayload) + Send,
    {
        let _busy = self.begin_session_op()?;
        if self.is_logged_in() || self.session().is_some_and(|s| s.has_key_material()) {
            return Err(ConnError::AlreadyLoggedIn);
        }
        self.ensure_connected().await?;
        let timeout = self.request_timeout();

        let mut raw_id = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut raw_id);
        let client_id = STANDARD.encode(raw_id);

        let reply = self
            .write_json(&self.init_message(&client_id))
            .await?
            .wait(timeout)
            .await
            .map_err(wait_error("login connection"))?;
        let init: Value = serde_json::from_slice(&reply)?;
        check_status_value(&init, "init")?;
        let reference = init
            .get("ref")
            .and_then(Value::as_str)
            .ok_or(LoginError::MissingField("ref"))?
            .to_string();
        let ttl = init
            .get("ttl")
            .and_then(Value::as_f64)
            .filter(|ms| *ms > 0.0)
            .and_then(|ms| Duration::try_from_secs_f64(ms / 1000.0).ok())
            .unwrap_or(timeout);

        *self.handshake.lock().await = Some(Vec::new());
        let scanned = self.await_scan(client_id, reference, ttl, on_qr).await;

        let mut backlog = self.handshake.lock().await;
        let held = backlog.take().unwrap_or_default();
        let (session, info, keys) = match scanned {
            Ok(scanned) => scanned,
            Err(err) => {
                if !held.is_empty() {
                    warn!("Dropping {} binary frames received during failed login", held.len());
                }
                return Err(err);
            }
        };

        *self.info.write().expect("RwLock should not be poisoned") = Some(info);
        *self.session.write().expect("RwLock should not be poisoned") = Some(session.clone());
        self.logged_in.store(true, Ordering::SeqCst);
        info!("Logged in as {}", session.wid);

        // Replay under the gate so frames read meanwhile queue up behind these.
        for payload in held {
            if let Err(err) = self.open_and_dispatch(&keys, &payload).await {
                if err.is_fatal() {
                    self.connection_lost(err).await;
                    break;
                }
                self.report_error(err).await;
            }
        }
        drop(backlog);
        Ok(session)
    }

    /// Show the QR code, wait for the phone and derive the session keys.
    async fn await_scan<F>(
        &self,
        client_id: String,
        reference: String,
        ttl: Duration,
        on_qr: F,
    ) -> Result<(Session, Info, SessionKeys), ConnError>
    where
        F: FnOnce(QrPayload) + Send,
    {
        let keypair = KeyPair::generate();
        let scanned = self.listeners.register(LOGIN_TAG);
        on_qr(QrPayload {
            reference,
            public_key: keypair.public_base64(),
            client_id: client_id.clone(),
        });

        let raw = scanned.wait(ttl).await.map_err(wait_error("qr code scan"))?;
        let reply: Value = serde_json::from_slice(&raw)?;
        let conn_info = connection_info(&reply)?;
        let secret = STANDARD
            .decode(string_field(conn_info, "secret")?)
            .map_err(|_| LoginError::InvalidBase64("secret"))?;
        let keys = derive_keys(&keypair, &secret)?;

        let mut session = Session {
            client_id,
            client_token: string_field(conn_info, "clientToken")?.to_string(),
            server_token: string_field(conn_info, "serverToken")?.to_string(),
            wid: string_field(conn_info, "wid")?.to_string(),
            ..Session::default()
        };
        session.set_keys(&keys);
        Ok((session, Info::from_value(conn_info), keys))
    }

    /// Resume the installed session without scanning. Connects first if needed.
    pub async fn restore(self: &Arc<Self>) -> Result<(), ConnError> {
        let _busy = self.begin_session_op()?;
        self.restore_session().await
    }

    /// Install `session` and resume it. On failure the previous session is
    /// put back. Returns the session with refreshed tokens.
    pub async fn restore_with_session(self: &Arc<Self>, session: Session) -> Result<Session, ConnError> {
        let _busy = self.begin_session_op()?;
        if self.is_logged_in() {
            return Err(ConnError::AlreadyLoggedIn);
        }

        let previous = self.session.write().expect("RwLock should not be poisoned").replace(session);
        match self.restore_session().await {
            Ok(()) => self.session().ok_or(ConnError::InvalidSession),
            Err(err) => {
                *self.session.write().expect("RwLock should not be poisoned") = previous;
                Err(err)
            }
        }
    }

    async fn restore_session(self: &Arc<Self>) -> Result<(), ConnError> {
        let session = self.session().ok_or(ConnError::InvalidSession)?;
        self.ensure_connected().await?;
        if self.is_logged_in() {
            return Err(ConnError::AlreadyLoggedIn);
        }
        let timeout = self.request_timeout();

        let conn_reply = self.listeners.register(LOGIN_TAG);
        let init = self.write_json(&self.init_message(&session.client_id)).await?;
        let mut login = self
            .write_json(&json!([
                "admin",
                "login",
                session.client_token,
                session.server_token,
                session.client_id,
                "takeover"
            ]))
            .await?;

        let reply = init.wait(timeout).await.map_err(wait_error("restore session init"))?;
        check_status(&reply, "init")?;

        let raw = match conn_reply.wait(timeout).await {
            Ok(raw) => raw,
            Err(_) => {
                // A rejected login is answered on its own tag instead of s1.
                if let Some(reply) = login.try_take() {
                    check_status(&reply, "admin login")?;
                }
                return Err(LoginError::Timeout("restore session connection").into());
            }
        };
        let mut conn_resp: Value = serde_json::from_slice(&raw)?;

        if let Some(challenge) = challenge_of(&conn_resp) {
            debug!("Resolving restore challenge");
            let follow_up = self.listeners.register(CHALLENGE_TAG);
            self.resolve_challenge(&session, &challenge).await?;
            let raw = follow_up
                .wait(timeout)
                .await
                .map_err(wait_error("restore session challenge"))?;
            conn_resp = serde_json::from_slice(&raw)?;
        }

        let reply = login.wait(timeout).await.map_err(wait_error("restore session login"))?;
        check_status(&reply, "admin login")?;

        let conn_info = connection_info(&conn_resp)?;
        let client_token = string_field(conn_info, "clientToken")?.to_string();
        let server_token = string_field(conn_info, "serverToken")?.to_string();
        let wid = string_field(conn_info, "wid")?.to_string();

        *self.info.write().expect("RwLock should not be poisoned") = Some(Info::from_value(conn_info));
        if let Some(current) = self.session.write().expect("RwLock should not be poisoned").as_mut() {
            current.client_token = client_token;
            current.server_token = server_token;
            current.wid = wid;
        }
        self.logged_in.store(true, Ordering::SeqCst);
        info!("Session restored");
        Ok(())
    }

    async fn resolve_challenge(&self, session: &Session, challenge: &str) -> Result<(), ConnError> {
        let answer = answer_challenge(&session.mac_key, challenge)?;
        let reply = self
            .write_json(&json!(["admin", "challenge", answer, session.server_token, session.client_id]))
            .await?
            .wait(self.request_timeout())
            .await
            .map_err(wait_error("challenge"))?;
        check_status(&reply, "challenge")
    }

    /// Log the phone out of this web session. The session becomes unusable.
    pub async fn logout(&self) -> Result<(), ConnError> {
        self.write_json(&json!(["admin", "Conn", "disconnect"])).await?;
        self.logged_in.store(false, Ordering::SeqCst);
        info!("Logged out");
        Ok(())
    }

    /// Ask the server whether the phone is reachable.
    pub async fn admin_test(&self) -> Result<bool, ConnError> {
        if !self.is_connected() {
            return Err(ConnError::NotConnected);
        }
        if !self.is_logged_in() {
            return Err(ConnError::InvalidSession);
        }
        let reply = self
            .write_json(&json!(["admin", "test"]))
            .await?
            .wait(self.request_timeout())
            .await?;
        let value: Value = serde_json::from_slice(&reply)?;
        Ok(value == json!(["Pong", true]))
    }

    /// Current WhatsApp Web version advertised by the server.
    pub async fn check_server_version(self: &Arc<Self>) -> Result<Vec<u32>, ConnError> {
        self.ensure_connected().await?;
        let mut raw_id = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut raw_id);

        let reply = self
            .write_json(&self.init_message(&STANDARD.encode(raw_id)))
            .await?
            .wait(self.request_timeout())
            .await?;
        let value: Value = serde_json::from_slice(&reply)?;
        let current = value
            .get("curr")
            .and_then(Value::as_str)
            .ok_or(ConnError::InvalidServerResponse)?;
        parse_version(current)
    }

    /// Change the client names shown on the phone. Only allowed before keys
    /// are negotiated.
    pub fn set_client_name(&self, long: &str, short: &str, version: &str) -> Result<(), ConnError> {
        if self.session().is_some_and(|s| s.has_key_material()) {
            return Err(ConnError::AlreadyLoggedIn);
        }
        let mut config = self.config.write().expect("RwLock should not be poisoned");
        config.long_client_name = long.to_string();
        config.short_client_name = short.to_string();
        config.client_version = version.to_string();
        Ok(())
    }

    /// Change the WhatsApp Web version announced in `admin init`.
    pub fn set_client_version(&self, major: u32, minor: u32, patch: u32) {
        self.config.write().expect("RwLock should not be poisoned").wa_version = [major, minor, patch];
    }

    pub fn client_version(&self) -> [u32; 3] {
        self.config.read().expect("RwLock should not be poisoned").wa_version
    }

    fn init_message(&self, client_id: &str) -> Value {
        let config = self.config();
        json!([
            "admin",
            "init",
            config.wa_version,
            [config.long_client_name, config.short_client_name, config.client_version],
            client_id,
            true
        ])
    }
}

fn wait_error(what: &'static str) -> impl Fn(ReplyError) -> ConnError {
    move |err| match err {
        ReplyError::Timeout => LoginError::Timeout(what).into(),
        ReplyError::Closed => ConnError::NotConnected,
    }
}

fn check_status(raw: &[u8], what: &'static str) -> Result<(), ConnError> {
    let value: Value = serde_json::from_slice(raw)?;
    check_status_value(&value, what)
}

fn check_status_value(value: &Value, what: &'static str) -> Result<(), ConnError> {
    let status = value
        .get("status")
        .and_then(Value::as_f64)
        .ok_or(ConnError::InvalidServerResponse)? as i64;
    if status != 200 {
        return Err(LoginError::Status { what, status }.into());
    }
    Ok(())
}

/// The object in `["Conn", {...}]`.
fn connection_info(reply: &Value) -> Result<&Value, ConnError> {
    reply
        .get(1)
        .filter(|info| info.is_object())
        .ok_or(ConnError::InvalidServerResponse)
}

fn string_field<'a>(info: &'a Value, key: &'static str) -> Result<&'a str, LoginError> {
    info.get(key).and_then(Value::as_str).ok_or(LoginError::MissingField(key))
}

/// The challenge in `["Cmd", {"type": "challenge", "challenge": ...}]`.
fn challenge_of(reply: &Value) -> Option<String> {
    let cmd = reply.get(1)?;
    if reply.get(0)?.as_str()? != "Cmd" || cmd.get("type")?.as_str()? != "challenge" {
        return None;
    }
    cmd.get("challenge")?.as_str().map(str::to_string)
}

fn parse_version(version: &str) -> Result<Vec<u32>, ConnError> {
    let parts = version
        .split('.')
        .map(|part| part.parse::<u32>().map_err(|_| ConnError::InvalidServerResponse))
        .collect::<Result<Vec<_>, _>>()?;
    if parts.len() != 3 {
        return Err(ConnError::InvalidServerResponse);
    }
    Ok(parts)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::super::testing::{
        session_with_keys, split_text, test_config, text, wait_until, EventLog, ScriptedFactory,
    };
    use super::*;
    use crate::crypto::hmac_sha256;
    use crate::binary::Node;
    use crate::session::phone_secret;
    use crate::socket::frame::seal_node;
    use crate::socket::WireMessage;
    use crate::types::EventKind;

    fn is_command(body: &Value, name: &str) -> bool {
        body.get(0).and_then(Value::as_str) == Some("admin") && body.get(1).and_then(Value::as_str) == Some(name)
    }

    #[tokio::test]
    async fn test_login_by_qr() {
        let factory = ScriptedFactory::new(|message| {
            let Some((tag, body)) = split_text(message) else { return Vec::new() };
            if is_command(&body, "init") {
                return vec![text(&tag, r#"{"status":200,"ref":"1@qr-ref","ttl":20000}"#)];
            }
            Vec::new()
        });
        let conn = Conn::with_factory(test_config(), factory.clone());
        let keys = SessionKeys {
            enc_key: [0x31; 32],
            mac_key: [0x32; 32],
        };

        let shown = Arc::new(Mutex::new(None));
        let shown_in = shown.clone();
        let factory_in = factory.clone();
        let phone_keys = keys.clone();
        let session = conn
            .login(move |qr| {
                let public: [u8; 32] = STANDARD.decode(&qr.public_key).unwrap().try_into().unwrap();
                let secret = STANDARD.encode(phone_secret(&public, &phone_keys));
                let info = json!(["Conn", {
                    "secret": secret,
                    "clientToken": "client-token",
                    "serverToken": "server-token",
                    "wid": "4915100000000@c.us",
                    "pushname": "Ann",
                    "platform": "android",
                    "battery": 81
                }]);
                factory_in.push_now(text(LOGIN_TAG, &info.to_string()));
                *shown_in.lock().unwrap() = Some(qr);
            })
            .await
            .unwrap();

        let qr = shown.lock().unwrap().clone().unwrap();
        assert_eq!(qr.reference, "1@qr-ref");
        assert_eq!(qr.client_id, session.client_id);
        assert_eq!(STANDARD.decode(&session.client_id).unwrap().len(), 16);

        assert_eq!(session.keys(), Some(keys));
        assert_eq!(session.client_token, "client-token");
        assert_eq!(session.wid, "4915100000000@c.us");
        assert!(conn.is_logged_in());
        assert_eq!(conn.info().unwrap().pushname, "Ann");

        let (_, init) = split_text(&factory.sent()[0]).unwrap();
        assert_eq!(init[2], json!([2, 2142, 12]));
        assert_eq!(init[3], json!(["waweb-rust", "waweb", env!("CARGO_PKG_VERSION")]));
        assert_eq!(init[4], json!(session.client_id));
        assert_eq!(init[5], json!(true));

        assert!(matches!(conn.login(|_| {}).await, Err(ConnError::AlreadyLoggedIn)));
    }

    #[tokio::test]
    async fn test_login_qr_expires() {
        let factory = ScriptedFactory::new(|message| {
            let Some((tag, _)) = split_text(message) else { return Vec::new() };
            vec![text(&tag, r#"{"status":200,"ref":"1@qr-ref","ttl":50}"#)]
        });
        let conn = Conn::with_factory(test_config(), factory);

        let err = conn.login(|_| {}).await.err().unwrap();
        assert!(matches!(err, ConnError::Login(LoginError::Timeout("qr code scan"))));
        assert!(!conn.is_logged_in());
        assert!(conn.begin_session_op().is_ok());
    }

    /// Server side of a restore that demands a challenge. The login reply is
    /// held back until the challenge was answered correctly.
    fn challenge_server(mac_key: [u8; 32]) -> Arc<ScriptedFactory> {
        let login_tag = Arc::new(Mutex::new(None::<String>));
        ScriptedFactory::new(move |message| {
            let Some((tag, body)) = split_text(message) else { return Vec::new() };
            if is_command(&body, "init") {
                let challenge = STANDARD.encode(b"nonce-from-server");
                let cmd = json!(["Cmd", {"type": "challenge", "challenge": challenge}]);
                return vec![text(&tag, r#"{"status":200}"#), text(LOGIN_TAG, &cmd.to_string())];
            }
            if is_command(&body, "login") {
                *login_tag.lock().unwrap() = Some(tag);
                return Vec::new();
            }
            if is_command(&body, "challenge") {
                let expected = STANDARD.encode(hmac_sha256(&mac_key, &[b"nonce-from-server".as_slice()]));
                if body[2] != json!(expected) {
                    return vec![text(&tag, r#"{"status":401}"#)];
                }
                let info = json!(["Conn", {
                    "clientToken": "rotated-client",
                    "serverToken": "rotated-server",
                    "wid": "4915100000000@c.us",
                    "pushname": "Ann"
                }]);
                let login = login_tag.lock().unwrap().clone().unwrap();
                return vec![
                    text(&tag, r#"{"status":200}"#),
                    text(CHALLENGE_TAG, &info.to_string()),
                    text(&login, r#"{"status":200}"#),
                ];
            }
            Vec::new()
        })
    }

    #[tokio::test]
    async fn test_restore_with_challenge() {
        let session = session_with_keys();
        let mac_key: [u8; 32] = session.mac_key.clone().try_into().unwrap();
        let factory = challenge_server(mac_key);
        let conn = Conn::with_factory(test_config(), factory.clone());

        let restored = conn.restore_with_session(session.clone()).await.unwrap();

        assert!(conn.is_logged_in());
        assert_eq!(restored.client_token, "rotated-client");
        assert_eq!(restored.server_token, "rotated-server");
        assert_eq!(restored.enc_key, session.enc_key);
        assert_eq!(conn.info().unwrap().pushname, "Ann");

        let commands: Vec<Value> = factory.sent().iter().map(|m| split_text(m).unwrap().1).collect();
        assert_eq!(commands.len(), 3);
        assert!(is_command(&commands[0], "init"));
        assert_eq!(
            commands[1],
            json!(["admin", "login", session.client_token, session.server_token, session.client_id, "takeover"])
        );
        assert!(is_command(&commands[2], "challenge"));
        assert_eq!(commands[2][3], json!(session.server_token));
        assert_eq!(commands[2][4], json!(session.client_id));
    }

    #[tokio::test]
    async fn test_restore_rejected_init_rolls_back() {
        let factory = ScriptedFactory::new(|message| {
            let Some((tag, body)) = split_text(message) else { return Vec::new() };
            if is_command(&body, "init") {
                return vec![text(&tag, r#"{"status":401}"#)];
            }
            Vec::new()
        });
        let conn = Conn::with_factory(test_config(), factory);

        let err = conn.restore_with_session(session_with_keys()).await.err().unwrap();
        assert!(matches!(err, ConnError::Login(LoginError::Status { what: "init", status: 401 })));
        assert!(conn.session().is_none());
        assert!(!conn.is_logged_in());
    }

    #[tokio::test]
    async fn test_restore_login_rejected_during_wait() {
        let factory = ScriptedFactory::new(|message| {
            let Some((tag, body)) = split_text(message) else { return Vec::new() };
            if is_command(&body, "init") {
                return vec![text(&tag, r#"{"status":200}"#)];
            }
            if is_command(&body, "login") {
                return vec![text(&tag, r#"{"status":403}"#)];
            }
            Vec::new()
        });
        let config = test_config().with_request_timeout(Duration::from_millis(100));
        let conn = Conn::with_factory(config, factory);

        let err = conn.restore_with_session(session_with_keys()).await.err().unwrap();
        assert!(matches!(
            err,
            ConnError::Login(LoginError::Status {
                what: "admin login",
                status: 403
            })
        ));
    }

    #[tokio::test]
    async fn test_restore_requires_session() {
        let conn = Conn::with_factory(test_config(), ScriptedFactory::silent());
        assert!(matches!(conn.restore().await, Err(ConnError::InvalidSession)));
    }

    #[tokio::test]
    async fn test_restore_while_busy() {
        let conn = Conn::with_factory(test_config(), ScriptedFactory::silent());
        let _busy = conn.begin_session_op().unwrap();
        assert!(matches!(conn.restore().await, Err(ConnError::LoginInProgress)));
        assert!(matches!(conn.login(|_| {}).await, Err(ConnError::LoginInProgress)));
    }

    #[tokio::test]
    async fn test_admin_test_and_logout() {
        let factory = ScriptedFactory::new(|message| {
            let Some((tag, body)) = split_text(message) else { return Vec::new() };
            if is_command(&body, "test") {
                return vec![text(&tag, r#"["Pong",true]"#)];
            }
            Vec::new()
        });
        let conn = Conn::with_factory(test_config(), factory.clone());
        assert!(matches!(conn.admin_test().await, Err(ConnError::NotConnected)));

        conn.connect().await.unwrap();
        assert!(matches!(conn.admin_test().await, Err(ConnError::InvalidSession)));

        conn.install_session(session_with_keys(), true);
        assert!(conn.admin_test().await.unwrap());

        conn.logout().await.unwrap();
        assert!(!conn.is_logged_in());
        let last = factory.sent().pop().unwrap();
        assert_eq!(split_text(&last).unwrap().1, json!(["admin", "Conn", "disconnect"]));
    }

    #[tokio::test]
    async fn test_check_server_version() {
        let factory = ScriptedFactory::new(|message| match split_text(message) {
            Some((tag, _)) => vec![text(&tag, r#"{"status":200,"ref":"1@x","ttl":20000,"curr":"2.2204.13"}"#)],
            None => Vec::new(),
        });
        let conn = Conn::with_factory(test_config(), factory);
        assert_eq!(conn.check_server_version().await.unwrap(), vec![2, 2204, 13]);
    }

    #[test]
    fn test_parse_version() {
        assert_eq!(parse_version("2.2142.12").unwrap(), vec![2, 2142, 12]);
        assert!(parse_version("2.2142").is_err());
        assert!(parse_version("2.x.12").is_err());
    }

    #[test]
    fn test_challenge_detection() {
        let cmd = json!(["Cmd", {"type": "challenge", "challenge": "Zm9v"}]);
        assert_eq!(challenge_of(&cmd).as_deref(), Some("Zm9v"));
        assert_eq!(challenge_of(&json!(["Conn", {"wid": "1@c.us"}])), None);
        assert_eq!(challenge_of(&json!(["Cmd", {"type": "disconnect"}])), None);
    }

    #[tokio::test]
    async fn test_client_name_locked_after_keys() {
        let conn = Conn::with_factory(test_config(), ScriptedFactory::silent());
        conn.set_client_name("Long Name", "Short", "1.0").unwrap();
        assert_eq!(conn.config().short_client_name, "Short");
        assert_eq!(conn.init_message("id")[3], json!(["Long Name", "Short", "1.0"]));

        conn.set_client_version(2, 2300, 1);
        assert_eq!(conn.client_version(), [2, 2300, 1]);

        conn.install_session(session_with_keys(), false);
        assert!(matches!(
            conn.set_client_name("Other", "O", "2.0"),
            Err(ConnError::AlreadyLoggedIn)
        ));
    }

    fn qr_server(init_reply: &'static str) -> Arc<ScriptedFactory> {
        ScriptedFactory::new(move |message| {
            let Some((tag, body)) = split_text(message) else { return Vec::new() };
            if is_command(&body, "init") {
                return vec![text(&tag, init_reply)];
            }
            Vec::new()
        })
    }

    fn scan_reply(qr: &QrPayload, keys: &SessionKeys) -> WireMessage {
        let public: [u8; 32] = STANDARD.decode(&qr.public_key).unwrap().try_into().unwrap();
        let info = json!(["Conn", {
            "secret": STANDARD.encode(phone_secret(&public, keys)),
            "clientToken": "client-token",
            "serverToken": "server-token",
            "wid": "4915100000000@c.us"
        }]);
        text(LOGIN_TAG, &info.to_string())
    }

    fn battery_push(keys: &SessionKeys) -> WireMessage {
        let mut action = Node::new("action");
        action.add_child(Node::new("battery").attr("live", "false").attr("value", "64"));
        let mut frame = b"1700000001-2,".to_vec();
        frame.extend_from_slice(&seal_node(keys, &action).unwrap());
        WireMessage::Binary(frame)
    }

    fn phone_keys() -> SessionKeys {
        SessionKeys {
            enc_key: [0x51; 32],
            mac_key: [0x52; 32],
        }
    }

    #[tokio::test]
    async fn test_push_right_after_scan_is_not_lost() {
        let factory = qr_server(r#"{"status":200,"ref":"1@qr-ref","ttl":20000}"#);
        let conn = Conn::with_factory(test_config(), factory.clone());
        let log = EventLog::attach(&conn);

        let pushes = factory.clone();
        conn.login(move |qr| {
            pushes.push_now(scan_reply(&qr, &phone_keys()));
            pushes.push_now(battery_push(&phone_keys()));
        })
        .await
        .unwrap();

        wait_until(|| log.kinds() == vec![EventKind::Battery]).await;
        assert!(log.errors().is_empty());
    }

    #[tokio::test]
    async fn test_push_before_scan_reply_is_replayed() {
        let factory = qr_server(r#"{"status":200,"ref":"1@qr-ref","ttl":20000}"#);
        let conn = Conn::with_factory(test_config(), factory.clone());
        let log = EventLog::attach(&conn);

        let pushes = factory.clone();
        conn.login(move |qr| {
            pushes.push_now(battery_push(&phone_keys()));
            pushes.push_now(scan_reply(&qr, &phone_keys()));
        })
        .await
        .unwrap();

        wait_until(|| log.kinds() == vec![EventKind::Battery]).await;
        assert!(conn.handshake.lock().await.is_none());
    }

    #[tokio::test]
    async fn test_failed_login_closes_handshake_window() {
        let factory = qr_server(r#"{"status":200,"ref":"1@qr-ref","ttl":50}"#);
        let conn = Conn::with_factory(test_config(), factory.clone());
        let log = EventLog::attach(&conn);

        let pushes = factory.clone();
        let err = conn
            .login(move |_| pushes.push_now(battery_push(&phone_keys())))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ConnError::Login(LoginError::Timeout("qr code scan"))));
        assert!(conn.handshake.lock().await.is_none());

        factory.push(battery_push(&phone_keys())).await;
        wait_until(|| log.errors().iter().any(|e| e.contains("without session keys"))).await;
        assert!(log.kinds().iter().all(|kind| *kind == EventKind::Error));
    }

    #[tokio::test]
    async fn test_fractional_ttl_is_honoured() {
        let factory = qr_server(r#"{"status":200,"ref":"1@qr-ref","ttl":60.0}"#);
        let conn = Conn::with_factory(test_config(), factory);

        let started = std::time::Instant::now();
        let err = conn.login(|_| {}).await.err().unwrap();
        assert!(matches!(err, ConnError::Login(LoginError::Timeout("qr code scan"))));
        assert!(started.elapsed() < conn.request_timeout());
    }

    #[tokio::test]
    async fn test_restore_without_challenge() {
        let login_tag = Arc::new(Mutex::new(None::<String>));
        let factory = ScriptedFactory::new(move |message| {
            let Some((tag, body)) = split_text(message) else { return Vec::new() };
            if is_command(&body, "init") {
                return vec![text(&tag, r#"{"status":200}"#)];
            }
            if is_command(&body, "login") {
                *login_tag.lock().unwrap() = Some(tag.clone());
                let info = json!(["Conn", {
                    "clientToken": "next-client",
                    "serverToken": "next-server",
                    "wid": "4915199999999@c.us",
                    "pushname": "Ann"
                }]);
                return vec![text(LOGIN_TAG, &info.to_string()), text(&tag, r#"{"status":200}"#)];
            }
            Vec::new()
        });
        let conn = Conn::with_factory(test_config(), factory.clone());
        conn.connect().await.unwrap();
        conn.install_session(session_with_keys(), false);

        conn.restore().await.unwrap();

        assert!(conn.is_logged_in());
        let session = conn.session().unwrap();
        assert_eq!(session.client_token, "next-client");
        assert_eq!(session.server_token, "next-server");
        assert_eq!(session.wid, "4915199999999@c.us");
        assert_eq!(session.mac_key, session_with_keys().mac_key);
        assert_eq!(conn.info().unwrap().pushname, "Ann");
        assert_eq!(factory.sent().len(), 2);
        assert_eq!(conn.listeners.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_logout_leaves_no_listener() {
        let conn = Conn::with_factory(test_config(), ScriptedFactory::silent());
        conn.connect().await.unwrap();
        conn.install_session(session_with_keys(), true);

        for _ in 0..5 {
            conn.logout().await.unwrap();
        }
        assert_eq!(conn.listeners.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_rejected_restore_leaves_no_listener() {
        let factory = ScriptedFactory::new(|message| {
            let Some((tag, body)) = split_text(message) else { return Vec::new() };
            if is_command(&body, "init") {
                return vec![text(&tag, r#"{"status":401}"#)];
            }
            Vec::new()
        });
        let conn = Conn::with_factory(test_config(), factory);

        assert!(conn.restore_with_session(session_with_keys()).await.is_err());
        assert_eq!(conn.listeners.pending_count(), 0);
    }
}
