//! Routing of decoded push nodes to events.

use log::debug;

use crate::binary::Node;
use crate::types::{normalize_user_jid, BatteryMessage, Chat, Contact, Event, RawMessage};

/// Turn an unsolicited node into the events it carries.
pub fn route_node(node: &Node) -> Vec<Event> {
    match node.description.as_str() {
        "action" => route_action(node),
        "response" => match node.get_attr("type") {
            Some("contacts") => vec![Event::ContactList(contact_list(node))],
            Some("chat") => vec![Event::ChatList(chat_list(node))],
            other => {
                debug!("Ignoring response of type {other:?}");
                Vec::new()
            }
        },
        other => {
            debug!("Ignoring unsolicited {other} node");
            Vec::new()
        }
    }
}

fn route_action(node: &Node) -> Vec<Event> {
    node.get_children()
        .unwrap_or_default()
        .iter()
        .filter_map(|child| match child.description.as_str() {
            "message" => Some(Event::Message(RawMessage::from_node(child))),
            "battery" => Some(Event::Battery(battery(child))),
            "user" => Some(Event::NewContact(contact(child))),
            _ => None,
        })
        .collect()
}

fn battery(node: &Node) -> BatteryMessage {
    BatteryMessage {
        plugged: node.get_attr("live") == Some("true"),
        powersave: node.get_attr("powersave") == Some("true"),
        value: node.get_attr("value").and_then(|v| v.parse().ok()).unwrap_or_default(),
    }
}

fn contact(node: &Node) -> Contact {
    let attr = |key: &str| node.get_attr(key).unwrap_or_default().to_string();
    Contact {
        jid: normalize_user_jid(node.get_attr("jid").unwrap_or_default()),
        notify: attr("notify"),
        name: attr("name"),
        short: attr("short"),
    }
}

fn contact_list(node: &Node) -> Vec<Contact> {
    node.get_children_by_description("user")
        .into_iter()
        .map(contact)
        .collect()
}

fn chat_list(node: &Node) -> Vec<Chat> {
    node.get_children()
        .unwrap_or_default()
        .iter()
        .map(|child| {
            let attr = |key: &str| child.get_attr(key).unwrap_or_default();
            Chat {
                jid: normalize_user_jid(attr("jid")),
                name: attr("name").to_string(),
                unread: attr("count").parse().unwrap_or_default(),
                last_message_time: attr("t").parse().unwrap_or_default(),
                muted: attr("mute").to_string(),
                marked_spam: attr("spam") == "true",
            }
        })
        .collect()
}
