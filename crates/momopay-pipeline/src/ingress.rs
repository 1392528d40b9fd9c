// SPDX-FileCopyrightText: 2026 Momopay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Webhook ingress: dedup, mask, persist, hand off.
//!
//! The webhook is acknowledged once the row is durable. Processing happens
//! on the worker; if the hand-off channel is full the stale-received sweep
//! picks the SMS up later.

use std::sync::Arc;

use chrono::{DateTime, DurationRound, TimeDelta, Utc};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use momopay_core::types::{NewInboundSms, SmsInsert};
use momopay_core::{MomopayError, StorageAdapter};
use momopay_security::{MsisdnRedactor, mask_address};

/// Body posted by the modem relay.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundSmsPayload {
    pub text: String,
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub received_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub modem_id: Option<String>,
    #[serde(default)]
    pub sim_slot: Option<String>,
}

/// Stable identity of one delivery, computed over the unmasked content so
/// two different senders never collide after masking.
pub fn dedup_key(from: Option<&str>, received_at: DateTime<Utc>, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(from.unwrap_or("").as_bytes());
    hasher.update(b"|");
    hasher.update(received_at.to_rfc3339().as_bytes());
    hasher.update(b"|");
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

pub struct IngressService {
    storage: Arc<dyn StorageAdapter>,
    redactor: MsisdnRedactor,
    work_tx: mpsc::Sender<String>,
}

impl IngressService {
    pub fn new(
        storage: Arc<dyn StorageAdapter>,
        redactor: MsisdnRedactor,
        work_tx: mpsc::Sender<String>,
    ) -> Self {
        Self {
            storage,
            redactor,
            work_tx,
        }
    }

    /// Persists one delivery. A replay of a stored delivery returns the
    /// existing id with `created: false` and is not re-queued.
    pub async fn accept(
        &self,
        payload: InboundSmsPayload,
        now: DateTime<Utc>,
    ) -> Result<SmsInsert, MomopayError> {
        let text = payload.text.trim();
        if text.is_empty() {
            return Err(MomopayError::Validation("text must not be empty".into()));
        }

        // Relays that omit the timestamp still dedupe within the minute.
        let received_at = match payload.received_at {
            Some(at) => at,
            None => now
                .duration_trunc(TimeDelta::minutes(1))
                .unwrap_or(now),
        };
        let key = dedup_key(payload.from.as_deref(), received_at, text);

        let sms = NewInboundSms {
            raw_text: self.redactor.redact(text),
            from_msisdn: payload.from.as_deref().map(mask_address),
            to_msisdn: payload.to.as_deref().map(mask_address),
            received_at,
            modem_id: payload.modem_id,
            sim_slot: payload.sim_slot,
            dedup_key: key,
        };
        let inserted = self.storage.insert_inbound_sms(&sms, now).await?;

        if !inserted.created {
            debug!(sms_id = %inserted.sms_id, "duplicate delivery ignored");
            return Ok(inserted);
        }
        info!(
            sms_id = %inserted.sms_id,
            modem_id = ?sms.modem_id,
            "inbound sms stored"
        );

        if let Err(e) = self.work_tx.try_send(inserted.sms_id.clone()) {
            warn!(
                sms_id = %inserted.sms_id,
                error = %e,
                "worker queue unavailable; leaving sms for the sweeper"
            );
        }
        Ok(inserted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::harness;
    use chrono::TimeZone;
    use tracing_test::traced_test;

    fn payload(text: &str) -> InboundSmsPayload {
        InboundSmsPayload {
            text: text.to_string(),
            from: Some("+250788123456".into()),
            to: Some("0722000111".into()),
            received_at: Some(Utc.with_ymd_and_hms(2026, 3, 1, 8, 30, 0).unwrap()),
            modem_id: Some("modem-1".into()),
            sim_slot: Some("1".into()),
        }
    }

    #[tokio::test]
    #[traced_test]
    async fn stores_masked_and_hands_off() {
        let h = harness().await;
        let (tx, mut rx) = mpsc::channel(4);
        let ingress = IngressService::new(h.storage.clone(), MsisdnRedactor::default(), tx);

        let inserted = ingress
            .accept(payload("You have received 15000 RWF from 0788123456. TxId: A1"), Utc::now())
            .await
            .unwrap();
        assert!(inserted.created);
        assert_eq!(rx.recv().await.unwrap(), inserted.sms_id);

        let sms = h.storage.get_inbound_sms(&inserted.sms_id).await.unwrap().unwrap();
        assert!(!sms.raw_text.contains("0788123456"));
        assert!(sms.raw_text.contains("078*****56"));
        assert_eq!(sms.from_msisdn.as_deref(), Some("250*******56"));
        assert_eq!(sms.modem_id.as_deref(), Some("modem-1"));
        assert!(logs_contain("inbound sms stored"));
        assert!(!logs_contain("0788123456"));
    }

    #[tokio::test]
    #[traced_test]
    async fn spaced_numbers_are_masked_everywhere() {
        let h = harness().await;
        let (tx, _rx) = mpsc::channel(4);
        let ingress = IngressService::new(h.storage.clone(), MsisdnRedactor::default(), tx);

        let mut spaced = payload("You have received 15000 RWF from 0788 123 456. TxId: ABC123");
        spaced.from = Some("+250 788 123 456".into());
        spaced.to = Some("0722-000-111".into());
        let inserted = ingress.accept(spaced, Utc::now()).await.unwrap();

        let sms = h.storage.get_inbound_sms(&inserted.sms_id).await.unwrap().unwrap();
        assert_eq!(sms.from_msisdn.as_deref(), Some("250*******56"));
        assert_eq!(sms.to_msisdn.as_deref(), Some("072*****11"));
        assert_eq!(
            sms.raw_text,
            "You have received 15000 RWF from 078*****56. TxId: ABC123"
        );
        assert!(!logs_contain("788 123 456"));
    }

    #[tokio::test]
    async fn replay_is_idempotent() {
        let h = harness().await;
        let (tx, mut rx) = mpsc::channel(4);
        let ingress = IngressService::new(h.storage.clone(), MsisdnRedactor::default(), tx);

        let first = ingress.accept(payload("Received 500 RWF. TxId: B2"), Utc::now()).await.unwrap();
        let second = ingress.accept(payload("Received 500 RWF. TxId: B2"), Utc::now()).await.unwrap();
        assert!(!second.created);
        assert_eq!(first.sms_id, second.sms_id);
        assert_eq!(rx.recv().await.unwrap(), first.sms_id);
        assert!(rx.try_recv().is_err());
        assert_eq!(h.storage.list_inbound_sms(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn same_text_from_different_senders_is_not_deduped() {
        let h = harness().await;
        let (tx, _rx) = mpsc::channel(4);
        let ingress = IngressService::new(h.storage.clone(), MsisdnRedactor::default(), tx);

        let mut other = payload("Received 500 RWF. TxId: B2");
        other.from = Some("+250788123499".into());
        let a = ingress.accept(payload("Received 500 RWF. TxId: B2"), Utc::now()).await.unwrap();
        let b = ingress.accept(other, Utc::now()).await.unwrap();
        assert!(a.created && b.created);
        assert_ne!(a.sms_id, b.sms_id);
    }

    #[tokio::test]
    async fn full_queue_still_persists() {
        let h = harness().await;
        let (tx, _rx) = mpsc::channel(1);
        let ingress = IngressService::new(h.storage.clone(), MsisdnRedactor::default(), tx);

        let mut second = payload("Received 700 RWF. TxId: C3");
        second.sim_slot = None;
        ingress.accept(payload("Received 600 RWF. TxId: C2"), Utc::now()).await.unwrap();
        let inserted = ingress.accept(second, Utc::now()).await.unwrap();
        assert!(inserted.created);
        assert_eq!(h.storage.list_inbound_sms(10).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn empty_text_is_rejected() {
        let h = harness().await;
        let (tx, _rx) = mpsc::channel(1);
        let ingress = IngressService::new(h.storage.clone(), MsisdnRedactor::default(), tx);
        let err = ingress.accept(payload("   "), Utc::now()).await.unwrap_err();
        assert_eq!(err.code(), "invalid_request");
    }

    #[test]
    fn dedup_key_is_stable_hex() {
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 8, 30, 0).unwrap();
        let a = dedup_key(Some("0788123456"), at, "hi");
        assert_eq!(a, dedup_key(Some("0788123456"), at, "hi"));
        assert_ne!(a, dedup_key(Some("0788123457"), at, "hi"));
        assert_eq!(a.len(), 64);
    }
}
