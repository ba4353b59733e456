//! Message identity dedup: colliding IDs with different content are
//! reassigned a derived ID instead of overwriting either turn.

use std::collections::HashMap;

use crate::models::Message;

/// Resolve ID collisions in an incoming batch against the stored messages
/// of one conversation.
///
/// A message whose ID is unseen passes through unchanged. A message whose
/// ID is stored with the same trimmed content passes through unchanged
/// (same turn, re-captured); an identical duplicate within the batch is
/// dropped. Any other collision lands on the smallest free `_dup{n}`
/// suffix, except that a taken candidate already holding the same trimmed
/// content is reused, so a retried capture maps onto the IDs its first
/// ingest assigned instead of minting more. Deterministic given a fixed
/// batch order; output IDs never collide.
#[must_use]
pub fn dedupe(incoming: Vec<Message>, existing_by_id: &HashMap<String, Message>) -> Vec<Message> {
    // Output IDs claimed so far, with the trimmed content each one holds
    let mut claimed: HashMap<String, String> = HashMap::new();
    let mut output = Vec::with_capacity(incoming.len());

    for mut message in incoming {
        let trimmed = message.content.trim().to_string();

        let collides = if let Some(earlier) = claimed.get(&message.id) {
            if *earlier == trimmed {
                continue;
            }
            true
        } else if let Some(existing) = existing_by_id.get(&message.id) {
            existing.content.trim() != trimmed
        } else {
            false
        };

        if collides {
            let Some(id) = derive_id(&message.id, &trimmed, existing_by_id, &claimed) else {
                continue;
            };
            message.id = id;
        }

        claimed.insert(message.id.clone(), trimmed);
        output.push(message);
    }

    output
}

/// Home for a colliding message: the smallest `{base}_dup{n}` with `n >= 1`
/// free in both the store and the batch so far, except that a candidate
/// stored with this exact trimmed content is returned instead (the turn was
/// reassigned there by an earlier ingest; the caller then treats it as
/// already present). `None` when an earlier message in this batch claimed
/// the content under a candidate, an identical duplicate to drop.
fn derive_id(
    base: &str,
    trimmed: &str,
    existing_by_id: &HashMap<String, Message>,
    claimed: &HashMap<String, String>,
) -> Option<String> {
    let mut n: u32 = 1;
    loop {
        let candidate = format!("{base}_dup{n}");
        if let Some(earlier) = claimed.get(&candidate) {
            if earlier.as_str() == trimmed {
                return None;
            }
        } else if let Some(existing) = existing_by_id.get(&candidate) {
            if existing.content.trim() == trimmed {
                return Some(candidate);
            }
        } else {
            return Some(candidate);
        }
        n += 1;
    }
}
