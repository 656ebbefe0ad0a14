// Models for the ESB stress harness

use chrono::{DateTime, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Message posted by the load generator and forwarded by the gateway
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// `<thread id>-<sequence number>`
    pub id: String,

    /// Random alphanumeric payload
    pub payload: String,

    /// Creation time
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn new(id: String, payload: String) -> Self {
        Self {
            id,
            payload,
            timestamp: Utc::now(),
        }
    }

    /// Build the message id for a worker and sequence number
    pub fn id_for(thread_id: usize, sequence: usize) -> String {
        format!("{}-{}", thread_id, sequence)
    }
}

/// Random alphanumeric payload of exactly `size` characters
pub fn random_payload<R: Rng + ?Sized>(rng: &mut R, size: usize) -> String {
    rng.sample_iter(&Alphanumeric)
        .take(size)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_message_id_format() {
        assert_eq!(Message::id_for(3, 17), "3-17");
    }

    #[test]
    fn test_random_payload_is_alphanumeric() {
        let mut rng = StdRng::seed_from_u64(1);
        let payload = random_payload(&mut rng, 256);
        assert_eq!(payload.len(), 256);
        assert!(payload.chars().all(|c| c.is_ascii_alphanumeric()));
        assert!(random_payload(&mut rng, 0).is_empty());
    }

    #[test]
    fn test_message_json_shape() {
        let message = Message::new("1-1".to_string(), "abc".to_string());
        let json = serde_json::to_value(&message).unwrap();

        assert_eq!(json["id"], "1-1");
        assert_eq!(json["payload"], "abc");
        let stamp = json["timestamp"].as_str().unwrap();
        assert!(DateTime::parse_from_rfc3339(stamp).is_ok());

        let decoded: Message = serde_json::from_value(json).unwrap();
        assert_eq!(decoded, message);
    }
}
