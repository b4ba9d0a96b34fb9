use log::debug;

use super::{Conn, ConnError};
use crate::binary::Node;
use crate::socket::frame::open_binary_payload;
use crate::socket::{Flags, Metric};

/// A `query` request for history, contacts, chats or media.
///
/// Empty fields are left out of the node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    pub query_type: String,
    pub jid: String,
    pub index: String,
    pub kind: String,
    pub owner: Option<bool>,
    pub search: String,
    pub count: u32,
    pub page: u32,
}

impl Query {
    pub fn new(query_type: impl Into<String>) -> Self {
        Self {
            query_type: query_type.into(),
            ..Self::default()
        }
    }

    pub fn with_jid(mut self, jid: impl Into<String>) -> Self {
        self.jid = jid.into();
        self
    }

    /// Message id to page from.
    pub fn with_index(mut self, index: impl Into<String>) -> Self {
        self.index = index.into();
        self
    }

    /// Paging direction, e.g. `before`.
    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = kind.into();
        self
    }

    /// Whether the message at `index` was sent by us.
    pub fn with_owner(mut self, owner: bool) -> Self {
        self.owner = Some(owner);
        self
    }

    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        self.search = search.into();
        self
    }

    pub fn with_count(mut self, count: u32) -> Self {
        self.count = count;
        self
    }

    pub fn with_page(mut self, page: u32) -> Self {
        self.page = page;
        self
    }

    fn metric(&self) -> Metric {
        if self.query_type == "media" {
            Metric::QueryMedia
        } else {
            Metric::Group
        }
    }

    fn to_node(&self, epoch: u64) -> Node {
        let mut node = Node::new("query")
            .attr("type", self.query_type.as_str())
            .attr("epoch", epoch.to_string());
        let optional = [
            ("jid", self.jid.clone()),
            ("index", self.index.clone()),
            ("kind", self.kind.clone()),
            ("owner", self.owner.map(|o| o.to_string()).unwrap_or_default()),
            ("search", self.search.clone()),
            ("count", nonzero(self.count)),
            ("page", nonzero(self.page)),
        ];
        for (key, value) in optional {
            if !value.is_empty() {
                node.set_attr(key, value);
            }
        }
        node
    }
}

fn nonzero(value: u32) -> String {
    if value == 0 {
        String::new()
    } else {
        value.to_string()
    }
}

impl Conn {
    /// Send a query and return the decrypted reply node.
    pub async fn query(&self, query: Query) -> Result<Node, ConnError> {
        let keys = self.session_keys().ok_or(ConnError::InvalidSession)?;
        let reply = self
            .send_node(query.metric(), Flags::IGNORE, |epoch| query.to_node(epoch))
            .await?;
        let payload = reply.wait(self.request_timeout()).await?;
        Ok(open_binary_payload(&keys, &payload)?)
    }

    /// Load up to `count` messages of `jid` older than `message_id`.
    ///
    /// The server answers 404 when `from_me` does not match the message, so
    /// a 404 is retried once with the owner flipped.
    pub async fn load_messages_before(
        &self,
        jid: &str,
        message_id: &str,
        from_me: bool,
        count: u32,
    ) -> Result<Node, ConnError> {
        let query = Query::new("message")
            .with_jid(jid)
            .with_index(message_id)
            .with_kind("before")
            .with_count(count);

        match self.query(query.clone().with_owner(from_me)).await {
            Err(ConnError::ServerRespondedWith404) => {
                debug!("Message {message_id} not found with owner={from_me}, retrying");
                self.query(query.with_owner(!from_me)).await
            }
            result => result,
        }
    }

    /// Request the contact list. Contacts are also pushed to the store and
    /// to handlers as a [`ContactList`](crate::types::Event::ContactList).
    pub async fn contacts(&self) -> Result<Node, ConnError> {
        let node = self.query(Query::new("contacts")).await?;
        self.dispatch_node(node.clone()).await;
        Ok(node)
    }

    /// Request the chat list; dispatched like [`Conn::contacts`].
    pub async fn chats(&self) -> Result<Node, ConnError> {
        let node = self.query(Query::new("chat")).await?;
        self.dispatch_node(node.clone()).await;
        Ok(node)
    }
}
