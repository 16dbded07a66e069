// ABOUTME: Event envelope that carries one chat message through the bot
// ABOUTME: Also holds the reply router that picks room, DM, or callback delivery

use crate::argv;
use crate::broker::Broker;
use crate::error::RouteError;
use crate::instance::Instance;
use crate::prefs::{PrefQuery, PreferenceStore, Prefs};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Weak};

/// Preference key that routes unforced replies to DM when set to "true"
pub const REPLY_VIA_DM: &str = "reply-via-dm";

/// Callback used instead of a broker when `to_func` is set
pub type ReplyFn = Arc<dyn Fn(String) + Send + Sync>;

/// The raw inbound unit an event was built from.
///
/// Brokers tag reactions as `Reaction` so plugins can tell them apart from
/// ordinary text without looking at the body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Original {
    #[default]
    None,
    PlainText(String),
    Reaction(String),
    Raw(serde_json::Value),
}

impl Original {
    pub fn is_reaction(&self) -> bool {
        matches!(self, Original::Reaction(_))
    }

    /// The reaction name, if this is a reaction
    pub fn reaction(&self) -> Option<&str> {
        match self {
            Original::Reaction(name) => Some(name),
            _ => None,
        }
    }
}

/// Generic container for events processed by the bot.
///
/// Brokers copy whatever they know into the fields; routing and most plugins
/// need at least `body`. When `to_user` and `to_room` are both set, a reply is
/// delivered twice.
#[derive(Clone, Serialize)]
pub struct Event {
    pub id: String,
    pub body: String,
    /// Optional command associated with the body, typically empty
    pub command: String,
    pub subject: String,
    pub room: String,
    pub room_id: String,
    pub user: String,
    pub user_id: String,
    pub time: DateTime<Utc>,
    #[serde(serialize_with = "serialize_broker")]
    pub broker: Option<Arc<dyn Broker>>,
    pub is_chat: bool,
    /// Message was generated by the bot
    pub is_bot: bool,
    pub to_user: bool,
    pub to_room: bool,
    pub to_func: bool,
    #[serde(skip)]
    pub reply_func: Option<ReplyFn>,
    #[serde(skip)]
    pub original: Original,
    #[serde(skip)]
    pub prefs: Option<Arc<dyn PreferenceStore>>,
    #[serde(skip)]
    instance: Option<Weak<Instance>>,
}

fn serialize_broker<S: Serializer>(
    broker: &Option<Arc<dyn Broker>>,
    s: S,
) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_str(broker.as_ref().map(|b| b.name()).unwrap_or(""))
}

impl Default for Event {
    fn default() -> Self {
        Self::new()
    }
}

impl Event {
    /// An empty event stamped with the current time
    pub fn new() -> Self {
        Self {
            id: String::new(),
            body: String::new(),
            command: String::new(),
            subject: String::new(),
            room: String::new(),
            room_id: String::new(),
            user: String::new(),
            user_id: String::new(),
            time: Utc::now(),
            broker: None,
            is_chat: false,
            is_bot: false,
            to_user: false,
            to_room: false,
            to_func: false,
            reply_func: None,
            original: Original::None,
            prefs: None,
            instance: None,
        }
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_user(mut self, name: impl Into<String>, id: impl Into<String>) -> Self {
        self.user = name.into();
        self.user_id = id.into();
        self
    }

    pub fn with_room(mut self, name: impl Into<String>, id: impl Into<String>) -> Self {
        self.room = name.into();
        self.room_id = id.into();
        self
    }

    pub fn with_broker(mut self, broker: Arc<dyn Broker>) -> Self {
        self.broker = Some(broker);
        self
    }

    pub fn with_prefs(mut self, prefs: Arc<dyn PreferenceStore>) -> Self {
        self.prefs = Some(prefs);
        self
    }

    /// Route replies to `f` instead of the broker
    pub fn with_reply_func(mut self, f: ReplyFn) -> Self {
        self.reply_func = Some(f);
        self.to_func = true;
        self
    }

    /// Attach plugin instance metadata. Only a weak handle is kept.
    pub fn attach(&mut self, instance: &Arc<Instance>) {
        self.instance = Some(Arc::downgrade(instance));
    }

    /// The attached instance, if any and still registered
    pub fn instance(&self) -> Option<Arc<Instance>> {
        self.instance.as_ref().and_then(Weak::upgrade)
    }

    /// Name of the attached plugin, or "" without plugin context
    pub fn plugin_name(&self) -> String {
        self.instance()
            .map(|i| i.plugin.name.clone())
            .unwrap_or_default()
    }

    /// Name of the attached broker, or "" when none is attached
    pub fn broker_name(&self) -> String {
        self.broker
            .as_ref()
            .map(|b| b.name().to_string())
            .unwrap_or_default()
    }

    /// A fresh outgoing event with the same broker, room, and user.
    ///
    /// The timestamp is reset; body, command, subject, and original are
    /// empty; force flags and the reply function are cleared.
    pub fn outgoing(&self) -> Event {
        Event {
            id: self.id.clone(),
            room: self.room.clone(),
            room_id: self.room_id.clone(),
            user: self.user.clone(),
            user_id: self.user_id.clone(),
            broker: self.broker.clone(),
            is_chat: self.is_chat,
            is_bot: self.is_bot,
            prefs: self.prefs.clone(),
            instance: self.instance.clone(),
            ..Event::new()
        }
    }

    /// Outgoing copy that always replies to the room, ahead of reply-via-dm.
    /// Chains: `evt.force_to_room().reply("go away!")`.
    pub fn force_to_room(&self) -> Event {
        let mut out = self.outgoing();
        out.to_room = true;
        out
    }

    /// Outgoing copy that always replies by DM, ahead of reply-via-dm.
    pub fn force_to_user(&self) -> Event {
        let mut out = self.outgoing();
        out.to_user = true;
        out
    }

    /// The body split into argv-style tokens, quotes removed
    pub fn body_as_argv(&self) -> Vec<String> {
        argv::tokenize(&self.body)
    }

    /// Reply to this event.
    ///
    /// Force flags are checked in order (function, room, user) and each one
    /// that is set delivers. With none set, the `reply-via-dm` preference for
    /// this user/room/broker/plugin decides; anything but "true" goes to the
    /// room.
    pub async fn reply(&self, msg: impl Into<String>) -> Result<()> {
        let msg = msg.into();
        let mut delivered = false;

        if self.to_func {
            let f = self.reply_func.as_ref().ok_or(RouteError::NoReplyFunc)?;
            f(msg.clone());
            delivered = true;
        }

        if self.to_room {
            self.reply_to_room(msg.clone()).await?;
            delivered = true;
        }

        if self.to_user {
            self.reply_dm(msg.clone()).await?;
            delivered = true;
        }

        if delivered {
            return Ok(());
        }

        if self.prefers_dm()? {
            self.reply_dm(msg).await
        } else {
            self.reply_to_room(msg).await
        }
    }

    /// `reply` with formatting: `evt.replyf(format_args!("{} up", host))`
    pub fn replyf(&self, args: fmt::Arguments<'_>) -> impl Future<Output = Result<()>> + Send + '_ {
        let msg = args.to_string();
        self.reply(msg)
    }

    /// Reply with the rendered error text
    pub fn error(&self, err: impl fmt::Display) -> impl Future<Output = Result<()>> + Send + '_ {
        let msg = err.to_string();
        self.reply(msg)
    }

    /// Send tabular data through the broker's table renderer.
    /// Bypasses force flags and preferences.
    pub async fn reply_table(&self, header: &[String], rows: &[Vec<String>]) -> Result<()> {
        let broker = self
            .broker
            .as_ref()
            .ok_or(RouteError::NoBroker { op: "reply_table" })?;
        broker.send_table(self.outgoing(), header, rows).await
    }

    /// Send `msg` to the user directly
    pub async fn reply_dm(&self, msg: impl Into<String>) -> Result<()> {
        let broker = self
            .broker
            .as_ref()
            .ok_or(RouteError::NoBroker { op: "reply_dm" })?;
        let mut out = self.outgoing();
        out.body = msg.into();
        broker.send_dm(out).await
    }

    /// Send `msg` to the room the event came from
    pub async fn reply_to_room(&self, msg: impl Into<String>) -> Result<()> {
        let broker = self
            .broker
            .as_ref()
            .ok_or(RouteError::NoBroker {
                op: "reply_to_room",
            })?;
        let mut out = self.outgoing();
        out.body = msg.into();
        broker.send(out).await
    }

    fn prefers_dm(&self) -> Result<bool> {
        let Some(store) = self.prefs.as_deref() else {
            return Ok(false);
        };
        let via = self.as_pref().find_key(store, REPLY_VIA_DM)?;
        Ok(via.one().is_some_and(|p| p.value == "true"))
    }

    /// Preference scope for this event: user id, room id, broker, plugin.
    /// Works without plugin context (plugin is then empty).
    pub fn as_pref(&self) -> PrefQuery {
        PrefQuery::new(
            &self.user_id,
            self.broker_name(),
            &self.room_id,
            self.plugin_name(),
            "",
        )
    }

    /// Every stored preference for this user, broker, room, and plugin.
    pub fn find_prefs(&self) -> Result<Prefs> {
        let Some(store) = self.prefs.as_deref() else {
            return Ok(Prefs::default());
        };
        store.find(&PrefQuery::new(
            &self.user,
            self.broker_name(),
            &self.room_id,
            self.plugin_name(),
            "",
        ))
    }

    /// Resolve every setting the attached plugin declares, in declaration
    /// order. Settings pinned to another room are skipped.
    pub fn instance_settings(&self) -> Result<Prefs> {
        let Some(instance) = self.instance() else {
            return Ok(Prefs::default());
        };
        let broker = self.broker_name();
        let plugin = &instance.plugin;

        let mut out = Prefs::default();
        for stg in plugin.settings.iter().filter(|s| s.applies_to(&self.room_id)) {
            let query = PrefQuery::new("", &broker, &self.room_id, &plugin.name, &stg.key);
            let pref = match self.prefs.as_deref() {
                Some(store) => store.get(&query, &stg.default)?,
                None => query.fallback(&stg.default),
            };
            out.push(pref);
        }
        Ok(out)
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("id", &self.id)
            .field("body", &self.body)
            .field("room", &self.room)
            .field("room_id", &self.room_id)
            .field("user", &self.user)
            .field("user_id", &self.user_id)
            .field("time", &self.time)
            .field("broker", &self.broker_name())
            .field("to_user", &self.to_user)
            .field("to_room", &self.to_room)
            .field("to_func", &self.to_func)
            .field("original", &self.original)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "User: {:?} Room: {:?} Time: {:?} Body: {:?}",
            self.user,
            self.room,
            self.time.to_rfc3339(),
            self.body
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::{InstanceRegistry, Plugin, PluginHandler, Setting};
    use crate::prefs::{MemoryPrefs, Preference};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Broker that records every delivery as (path, body)
    #[derive(Default)]
    struct RecordingBroker {
        sent: Mutex<Vec<(&'static str, String)>>,
    }

    impl RecordingBroker {
        fn sent(&self) -> Vec<(&'static str, String)> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Broker for RecordingBroker {
        fn name(&self) -> &str {
            "recorder"
        }
        async fn send(&self, evt: Event) -> Result<()> {
            self.sent.lock().unwrap().push(("room", evt.body));
            Ok(())
        }
        async fn send_dm(&self, evt: Event) -> Result<()> {
            self.sent.lock().unwrap().push(("dm", evt.body));
            Ok(())
        }
        async fn send_table(
            &self,
            evt: Event,
            header: &[String],
            rows: &[Vec<String>],
        ) -> Result<()> {
            assert!(evt.body.is_empty());
            self.sent
                .lock()
                .unwrap()
                .push(("table", format!("{}x{}", header.len(), rows.len())));
            Ok(())
        }
        fn room_id_to_name(&self, id: &str) -> String {
            id.to_string()
        }
        fn room_name_to_id(&self, name: &str) -> String {
            name.to_string()
        }
        fn user_id_to_name(&self, id: &str) -> String {
            id.to_string()
        }
        fn user_name_to_id(&self, name: &str) -> String {
            name.to_string()
        }
    }

    struct Noop;

    #[async_trait]
    impl PluginHandler for Noop {
        async fn handle(&self, _evt: Event) -> Result<()> {
            Ok(())
        }
    }

    fn inbound(broker: &Arc<RecordingBroker>) -> Event {
        let mut evt = Event::new()
            .with_body("hello")
            .with_user("alice", "U1")
            .with_room("ops", "R1")
            .with_broker(broker.clone());
        evt.id = "evt-1".to_string();
        evt.command = "hello".to_string();
        evt.subject = "greeting".to_string();
        evt.is_chat = true;
        evt.original = Original::PlainText("hello".to_string());
        evt
    }

    fn with_dm_pref(evt: Event, value: &str) -> Event {
        let store = MemoryPrefs::new();
        store
            .set(
                Preference::new(REPLY_VIA_DM, value)
                    .user("U1")
                    .room("R1")
                    .broker("recorder"),
            )
            .unwrap();
        evt.with_prefs(Arc::new(store))
    }

    #[test]
    fn test_outgoing_resets_content() {
        let broker = Arc::new(RecordingBroker::default());
        let evt = inbound(&broker);
        let out = evt.outgoing();

        assert_eq!(out.id, "evt-1");
        assert_eq!(out.user_id, "U1");
        assert_eq!(out.room_id, "R1");
        assert!(out.is_chat);
        assert_eq!(out.broker_name(), "recorder");
        assert!(out.body.is_empty());
        assert!(out.command.is_empty());
        assert!(out.subject.is_empty());
        assert_eq!(out.original, Original::None);
        assert!(out.time >= evt.time);
    }

    #[test]
    fn test_outgoing_clears_force_flags() {
        let broker = Arc::new(RecordingBroker::default());
        let mut evt = inbound(&broker);
        evt.to_room = true;
        evt.to_user = true;
        let out = evt.outgoing();
        assert!(!out.to_room);
        assert!(!out.to_user);
        assert!(!out.to_func);
        assert!(out.reply_func.is_none());
    }

    #[test]
    fn test_force_helpers_leave_original_untouched() {
        let broker = Arc::new(RecordingBroker::default());
        let evt = inbound(&broker);

        let room = evt.force_to_room();
        assert!(room.to_room && !room.to_user);
        let user = evt.force_to_user();
        assert!(user.to_user && !user.to_room);

        assert!(!evt.to_room && !evt.to_user);
        assert_eq!(evt.body, "hello");
    }

    #[tokio::test]
    async fn test_reply_defaults_to_room() {
        let broker = Arc::new(RecordingBroker::default());
        inbound(&broker).reply("hi").await.unwrap();
        assert_eq!(broker.sent(), vec![("room", "hi".to_string())]);
    }

    #[tokio::test]
    async fn test_reply_func_wins_over_preferences() {
        let broker = Arc::new(RecordingBroker::default());
        let seen = Arc::new(Mutex::new(Vec::<String>::new()));
        let sink = Arc::clone(&seen);
        let evt = with_dm_pref(inbound(&broker), "true")
            .with_reply_func(Arc::new(move |msg: String| sink.lock().unwrap().push(msg)));

        evt.reply("callback").await.unwrap();

        assert_eq!(*seen.lock().unwrap(), vec!["callback".to_string()]);
        assert!(broker.sent().is_empty());
    }

    #[tokio::test]
    async fn test_reply_forced_room_delivers_once() {
        let broker = Arc::new(RecordingBroker::default());
        let evt = with_dm_pref(inbound(&broker), "true").force_to_room();
        evt.reply("x").await.unwrap();
        assert_eq!(broker.sent(), vec![("room", "x".to_string())]);
    }

    #[tokio::test]
    async fn test_reply_func_fires_alongside_forced_deliveries() {
        let broker = Arc::new(RecordingBroker::default());
        let seen = Arc::new(Mutex::new(Vec::<String>::new()));
        let sink = Arc::clone(&seen);
        let mut evt = inbound(&broker)
            .with_reply_func(Arc::new(move |msg: String| sink.lock().unwrap().push(msg)));
        evt.to_room = true;
        evt.to_user = true;

        evt.reply("all").await.unwrap();

        assert_eq!(*seen.lock().unwrap(), vec!["all".to_string()]);
        assert_eq!(
            broker.sent(),
            vec![("room", "all".to_string()), ("dm", "all".to_string())]
        );
    }

    #[tokio::test]
    async fn test_reply_func_with_forced_user_skips_preferences() {
        let broker = Arc::new(RecordingBroker::default());
        let seen = Arc::new(Mutex::new(Vec::<String>::new()));
        let sink = Arc::clone(&seen);
        let mut evt = with_dm_pref(inbound(&broker), "false")
            .with_reply_func(Arc::new(move |msg: String| sink.lock().unwrap().push(msg)));
        evt.to_user = true;

        evt.reply("psst").await.unwrap();

        assert_eq!(*seen.lock().unwrap(), vec!["psst".to_string()]);
        assert_eq!(broker.sent(), vec![("dm", "psst".to_string())]);
    }

    #[tokio::test]
    async fn test_reply_forced_room_and_user_delivers_twice() {
        let broker = Arc::new(RecordingBroker::default());
        let mut evt = inbound(&broker).force_to_room();
        evt.to_user = true;
        evt.reply("both").await.unwrap();
        assert_eq!(
            broker.sent(),
            vec![("room", "both".to_string()), ("dm", "both".to_string())]
        );
    }

    #[tokio::test]
    async fn test_reply_via_dm_preference() {
        let broker = Arc::new(RecordingBroker::default());
        with_dm_pref(inbound(&broker), "true")
            .reply("psst")
            .await
            .unwrap();
        assert_eq!(broker.sent(), vec![("dm", "psst".to_string())]);
    }

    #[tokio::test]
    async fn test_reply_via_dm_other_value_goes_to_room() {
        let broker = Arc::new(RecordingBroker::default());
        with_dm_pref(inbound(&broker), "yes")
            .reply("loud")
            .await
            .unwrap();
        assert_eq!(broker.sent(), vec![("room", "loud".to_string())]);
    }

    #[tokio::test]
    async fn test_reply_via_dm_other_user_is_ignored() {
        let broker = Arc::new(RecordingBroker::default());
        let evt = with_dm_pref(inbound(&broker), "true").with_user("bob", "U2");
        evt.reply("hey").await.unwrap();
        assert_eq!(broker.sent(), vec![("room", "hey".to_string())]);
    }

    #[tokio::test]
    async fn test_reply_without_broker_is_route_error() {
        let err = Event::new().reply("lost").await.unwrap_err();
        assert_eq!(
            err.downcast_ref::<RouteError>(),
            Some(&RouteError::NoBroker {
                op: "reply_to_room"
            })
        );
    }

    #[tokio::test]
    async fn test_to_func_without_function_is_route_error() {
        let mut evt = Event::new();
        evt.to_func = true;
        let err = evt.reply("lost").await.unwrap_err();
        assert_eq!(
            err.downcast_ref::<RouteError>(),
            Some(&RouteError::NoReplyFunc)
        );
    }

    #[tokio::test]
    async fn test_replyf_and_error() {
        let broker = Arc::new(RecordingBroker::default());
        let evt = inbound(&broker);
        evt.replyf(format_args!("{} + {} = {}", 1, 2, 3))
            .await
            .unwrap();
        evt.error(anyhow::anyhow!("disk full")).await.unwrap();
        assert_eq!(
            broker.sent(),
            vec![
                ("room", "1 + 2 = 3".to_string()),
                ("room", "disk full".to_string())
            ]
        );
    }

    #[tokio::test]
    async fn test_reply_table_bypasses_routing() {
        let broker = Arc::new(RecordingBroker::default());
        let evt = with_dm_pref(inbound(&broker), "true").force_to_user();
        let header = vec!["a".to_string(), "b".to_string()];
        let rows = vec![vec!["1".to_string(), "2".to_string()]];
        evt.reply_table(&header, &rows).await.unwrap();
        assert_eq!(broker.sent(), vec![("table", "2x1".to_string())]);
    }

    #[test]
    fn test_as_pref_without_instance() {
        let broker = Arc::new(RecordingBroker::default());
        let q = inbound(&broker).as_pref();
        assert_eq!(q.user, "U1");
        assert_eq!(q.room, "R1");
        assert_eq!(q.broker, "recorder");
        assert_eq!(q.plugin, "");
        assert_eq!(Event::new().as_pref(), PrefQuery::default());
    }

    #[test]
    fn test_instance_handle_is_weak() {
        let mut registry = InstanceRegistry::new();
        let plugin = Arc::new(Plugin::new("echo", Arc::new(Noop)));
        let inst = registry.register(plugin, "recorder", "R1");

        let mut evt = Event::new();
        evt.attach(&inst);
        assert_eq!(evt.plugin_name(), "echo");

        drop(inst);
        drop(registry);
        assert!(evt.instance().is_none());
        assert_eq!(evt.plugin_name(), "");
    }

    #[test]
    fn test_instance_settings_resolution() {
        let broker = Arc::new(RecordingBroker::default());
        let store = MemoryPrefs::new();
        store
            .set(
                Preference::new("interval", "10")
                    .broker("recorder")
                    .room("R1")
                    .plugin("uptime"),
            )
            .unwrap();

        let plugin = Plugin::new("uptime", Arc::new(Noop))
            .with_setting(Setting::new("interval", "60"))
            .with_setting(Setting::new("other-room-only", "x").in_room("R9"))
            .with_setting(Setting::new("target", "localhost"));
        let mut registry = InstanceRegistry::new();
        let inst = registry.register(Arc::new(plugin), "recorder", "R1");

        let mut evt = inbound(&broker).with_prefs(Arc::new(store));
        evt.attach(&inst);

        let settings = evt.instance_settings().unwrap();
        let resolved: Vec<_> = settings
            .iter()
            .map(|p| (p.key.as_str(), p.value.as_str(), p.success))
            .collect();
        assert_eq!(
            resolved,
            vec![("interval", "10", true), ("target", "localhost", false)]
        );
    }

    #[test]
    fn test_find_prefs_union() {
        let broker = Arc::new(RecordingBroker::default());
        let store = MemoryPrefs::new();
        store
            .set(Preference::new("a", "1").user("alice").room("R1").broker("recorder"))
            .unwrap();
        store
            .set(Preference::new("b", "2").user("alice").room("R1").broker("recorder"))
            .unwrap();
        store
            .set(Preference::new("c", "3").user("bob").room("R1").broker("recorder"))
            .unwrap();

        let prefs = inbound(&broker)
            .with_prefs(Arc::new(store))
            .find_prefs()
            .unwrap();
        assert_eq!(prefs.len(), 2);
    }

    #[test]
    fn test_body_as_argv() {
        let evt = Event::new().with_body(r#"  !uptime add "web 1" 'db' "#);
        assert_eq!(evt.body_as_argv(), vec!["!uptime", "add", "web 1", "db"]);
    }

    #[test]
    fn test_display_and_json() {
        let broker = Arc::new(RecordingBroker::default());
        let evt = inbound(&broker);
        let text = evt.to_string();
        assert!(text.starts_with(r#"User: "alice" Room: "ops" Time: "#));
        assert!(text.ends_with(r#"Body: "hello""#));

        let json = serde_json::to_value(&evt).unwrap();
        assert_eq!(json["broker"], "recorder");
        assert_eq!(json["room_id"], "R1");
        assert_eq!(json["to_user"], false);
        assert!(json.get("original").is_none());
    }

    #[test]
    fn test_original_reaction() {
        let o = Original::Reaction(":+1:".to_string());
        assert!(o.is_reaction());
        assert_eq!(o.reaction(), Some(":+1:"));
        assert!(!Original::PlainText("x".into()).is_reaction());
    }
}
