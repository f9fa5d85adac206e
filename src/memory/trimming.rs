//! 上下文窗口裁剪
//!
//! 保留全部 system 消息 + 最近 N 条非 system 消息，并且从一条 user 消息开始，
//! 避免把「工具调用 -> 观察」拆开。若最近 N 条里没有 user 消息，则从最后一条 user 消息开始保留。

use crate::memory::{Message, Role};

pub fn trim_history(messages: &[Message], window: usize) -> Vec<Message> {
    let (system, rest): (Vec<&Message>, Vec<&Message>) =
        messages.iter().partition(|m| m.role == Role::System);

    let tail_start = rest.len().saturating_sub(window.max(1));
    let start = match rest[tail_start..].iter().position(|m| m.role == Role::User) {
        Some(offset) => tail_start + offset,
        None => rest
            .iter()
            .rposition(|m| m.role == Role::User)
            .unwrap_or(tail_start),
    };

    system
        .into_iter()
        .chain(rest[start..].iter().copied())
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roles(ms: &[Message]) -> Vec<Role> {
        ms.iter().map(|m| m.role).collect()
    }

    #[test]
    fn test_short_history_unchanged() {
        let ms = vec![Message::system("s"), Message::user("u"), Message::assistant("a")];
        assert_eq!(trim_history(&ms, 12), ms);
    }

    #[test]
    fn test_starts_on_user_message() {
        let ms = vec![
            Message::system("s"),
            Message::user("u1"),
            Message::assistant("{\"tool_calls\":[]}"),
            Message::tool("c1", "get_order_status", "{}"),
            Message::assistant("a1"),
            Message::user("u2"),
            Message::assistant("a2"),
        ];
        let trimmed = trim_history(&ms, 3);
        assert_eq!(roles(&trimmed), vec![Role::System, Role::User, Role::Assistant]);
        assert_eq!(trimmed[1].content, "u2");
    }

    #[test]
    fn test_long_tool_sequence_keeps_current_question() {
        let mut ms = vec![Message::user("where is my order?")];
        for i in 0..6 {
            ms.push(Message::assistant(format!("call {i}")));
            ms.push(Message::tool(format!("c{i}"), "track_shipment", "{}"));
        }
        let trimmed = trim_history(&ms, 4);
        assert_eq!(trimmed[0].content, "where is my order?");
        assert_eq!(trimmed.len(), ms.len());
    }
}
