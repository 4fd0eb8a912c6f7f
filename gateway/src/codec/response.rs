//! Response decoder: callback body in, authenticated record out.
//!
//! ```text
//! body ──► strict form parse ──► trandata ──► AES-CBC open ──► strict form parse
//!          (CallbackFormat)                    (Authentication)
//!      ──► cleartext cross-check ──► field mapping ──► TransactionRecord
//!          (Authentication)          (FieldValidation)
//! ```
//!
//! Only values recovered from the encrypted payload reach the record.
//! Cleartext fields must agree with their encrypted copies; cleartext fields
//! with no encrypted copy are dropped, `Error`/`ErrorText` included.

use tracing::{debug, info, warn};

use super::form::{parse_strict, FormFields};
use crate::config::{
    FIELD_AMOUNT, FIELD_AUTH, FIELD_AUTH_RESP_CODE, FIELD_AVR, FIELD_ERROR, FIELD_ERROR_TEXT,
    FIELD_PAYMENT_ID, FIELD_POST_DATE, FIELD_REF, FIELD_RESULT, FIELD_TRACK_ID, FIELD_TRANDATA,
    FIELD_TRAN_ID, MAX_CALLBACK_BYTES, UDF_COUNT, UDF_FIELDS,
};
use crate::crypto::{transport, KeyMaterial};
use crate::error::{GatewayError, Result};
use crate::resource::TerminalProfile;
use crate::transaction::{Amount, PostDate, TrackId, TransactionRecord};

fn trim_ascii(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    let end = bytes
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |i| i + 1);
    &bytes[start..end]
}

/// Logs why a callback was rejected and returns the detail-free error.
fn reject(profile: &TerminalProfile, reason: impl std::fmt::Display) -> GatewayError {
    warn!(
        alias = profile.terminal_alias(),
        reason = %reason,
        "callback failed authentication"
    );
    GatewayError::Authentication
}

/// Present and non-empty.
fn optional<'a>(fields: &'a FormFields, key: &str) -> Option<&'a str> {
    fields.get(key).filter(|v| !v.is_empty())
}

fn required<'a>(fields: &'a FormFields, key: &'static str) -> Result<&'a str> {
    optional(fields, key).ok_or_else(|| GatewayError::field(key, "missing"))
}

/// Digits only. `u64::from_str` would also take a leading `+`.
fn parse_u64(field: &'static str, raw: &str) -> Result<u64> {
    if !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(GatewayError::field(field, "not a decimal number"));
    }
    raw.parse()
        .map_err(|_| GatewayError::field(field, "out of range"))
}

fn alphanumeric(field: &'static str, raw: Option<&str>) -> Result<Option<String>> {
    match raw {
        Some(v) if !v.bytes().all(|b| b.is_ascii_alphanumeric()) => {
            Err(GatewayError::field(field, "not alphanumeric"))
        }
        other => Ok(other.map(str::to_string)),
    }
}

fn map_record(profile: &TerminalProfile, payload: &FormFields) -> Result<TransactionRecord> {
    let payment_id = parse_u64(FIELD_PAYMENT_ID, required(payload, FIELD_PAYMENT_ID)?)?;
    let result = required(payload, FIELD_RESULT)?.to_string();
    let track_id = TrackId::new(required(payload, FIELD_TRACK_ID)?)
        .map_err(|e| GatewayError::field(FIELD_TRACK_ID, e.to_string()))?;

    let amount = optional(payload, FIELD_AMOUNT)
        .map(|v| Amount::parse(v, profile.currency()))
        .transpose()
        .map_err(|e| GatewayError::field(FIELD_AMOUNT, e.to_string()))?;
    let post_date = optional(payload, FIELD_POST_DATE)
        .map(PostDate::parse)
        .transpose()
        .map_err(|e| GatewayError::field(FIELD_POST_DATE, e.to_string()))?;
    let tran_id = optional(payload, FIELD_TRAN_ID)
        .map(|v| parse_u64(FIELD_TRAN_ID, v))
        .transpose()?;

    let mut udfs: [Option<String>; UDF_COUNT] = Default::default();
    for (slot, name) in udfs.iter_mut().zip(UDF_FIELDS) {
        *slot = optional(payload, name).map(str::to_string);
    }


    Ok(TransactionRecord {
        payment_id,
        result,
        auth: alphanumeric(FIELD_AUTH, optional(payload, FIELD_AUTH))?,
        amount,
        reference: alphanumeric(FIELD_REF, optional(payload, FIELD_REF))?,
        post_date,
        track_id,
        tran_id,
        avr: alphanumeric(FIELD_AVR, optional(payload, FIELD_AVR))?,
        auth_resp_code: alphanumeric(FIELD_AUTH_RESP_CODE, optional(payload, FIELD_AUTH_RESP_CODE))?,
        udfs,
        error: optional(payload, FIELD_ERROR).map(str::to_string),
        error_text: optional(payload, FIELD_ERROR_TEXT).map(str::to_string),
    })
}

/// Decodes and authenticates a callback body for this terminal.
pub fn decode(
    profile: &TerminalProfile,
    material: &KeyMaterial,
    body: &[u8],
) -> Result<TransactionRecord> {
    let body = trim_ascii(body);
    if body.len() > MAX_CALLBACK_BYTES {
        return Err(GatewayError::CallbackFormat(format!(
            "body exceeds {MAX_CALLBACK_BYTES} bytes"
        )));
    }
    let cleartext =
        parse_strict(body).map_err(|e| GatewayError::CallbackFormat(e.to_string()))?;

    let Some(trandata) = cleartext.get(FIELD_TRANDATA) else {
        return match cleartext.get(FIELD_ERROR) {
            Some(code) => {
                let text = cleartext.get(FIELD_ERROR_TEXT).unwrap_or_default();
                info!(
                    alias = profile.terminal_alias(),
                    code,
                    "gateway redirected with an error and no result"
                );
                Err(GatewayError::GatewayReported {
                    code: code.to_string(),
                    text: text.to_string(),
                })
            }
            None => Err(GatewayError::CallbackFormat(format!(
                "missing {FIELD_TRANDATA}"
            ))),
        };
    };

    let plaintext =
        transport::open(material.inbound(), trandata).map_err(|e| reject(profile, e))?;
    let payload = parse_strict(&plaintext).map_err(|e| reject(profile, e))?;

    for (key, value) in cleartext.iter().filter(|(k, _)| *k != FIELD_TRANDATA) {
        match payload.get(key) {
            Some(sealed) if sealed != value => {
                return Err(reject(
                    profile,
                    format!("cleartext {key} disagrees with encrypted payload"),
                ));
            }
            Some(_) => {}
            None => debug!(
                alias = profile.terminal_alias(),
                field = key,
                "ignoring cleartext field with no encrypted copy"
            ),
        }
    }

    let record = map_record(profile, &payload)?;
    info!(
        alias = profile.terminal_alias(),
        track_id = %record.track_id,
        payment_id = record.payment_id,
        result = %record.result,
        "callback authenticated"
    );
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::form::encode_pairs;
    use crate::resource::{parse_terminal, LoadedTerminal};
    use crate::transaction::{Currency, Language, TransactionOutcome};

    const TERMINAL: &str = "<terminal><id>ipay1234</id><password>pw</password>\
        <webaddress>https://gateway.example/pg</webaddress>\
        <resourceKey>0123456789ABCDEF</resourceKey></terminal>";

    fn terminal() -> LoadedTerminal {
        parse_terminal(TERMINAL, "alias", Currency::KWD, Language::English).unwrap()
    }

    fn seal(t: &LoadedTerminal, pairs: &[(&str, &str)]) -> String {
        let plain = encode_pairs(pairs.iter().copied());
        transport::seal(t.material.outbound(), plain.as_bytes()).unwrap()
    }

    fn body(trandata: &str, extra: &str) -> Vec<u8> {
        format!("trandata={trandata}{extra}").into_bytes()
    }

    const CAPTURED: &[(&str, &str)] = &[
        ("paymentid", "100201234567890"),
        ("result", "CAPTURED"),
        ("auth", "B12345"),
        ("amt", "1.234"),
        ("ref", "123456789012"),
        ("postdate", "0315"),
        ("trackid", "TX1001"),
        ("tranid", "2001234"),
        ("udf1", "order 42"),
    ];

    #[test]
    fn test_decode_full_record() {
        let t = terminal();
        let rec = decode(&t.profile, &t.material, &body(&seal(&t, CAPTURED), "")).unwrap();
        assert_eq!(rec.payment_id, 100_201_234_567_890);
        assert_eq!(rec.outcome(), TransactionOutcome::Captured);
        assert_eq!(rec.auth.as_deref(), Some("B12345"));
        assert_eq!(rec.amount, Some(Amount::new(1_234, Currency::KWD)));
        assert_eq!(rec.post_date.unwrap().to_string(), "0315");
        assert_eq!(rec.track_id, "TX1001");
        assert_eq!(rec.tran_id, Some(2_001_234));
        assert_eq!(rec.udf(1), Some("order 42"));
        assert_eq!(rec.avr, None);
        assert_eq!(rec.error, None);
    }

    #[test]
    fn test_minimal_record_leaves_optionals_empty() {
        let t = terminal();
        let blob = seal(
            &t,
            &[("paymentid", "1"), ("result", "NOT CAPTURED"), ("trackid", "T1"), ("postdate", "")],
        );
        let rec = decode(&t.profile, &t.material, &body(&blob, "")).unwrap();
        assert!(!rec.is_approved());
        assert_eq!(rec.post_date, None);
        assert_eq!(rec.amount, None);
        assert_eq!(rec.tran_id, None);
        assert!(rec.udfs.iter().all(Option::is_none));
    }

    #[test]
    fn test_surrounding_whitespace_is_ignored() {
        let t = terminal();
        let mut raw = body(&seal(&t, CAPTURED), "");
        raw.extend_from_slice(b"\r\n");
        assert!(decode(&t.profile, &t.material, &raw).is_ok());
    }

    #[test]
    fn test_matching_cleartext_accepted_mismatch_rejected() {
        let t = terminal();
        let blob = seal(&t, CAPTURED);
        let ok = body(&blob, "&result=CAPTURED&trackid=TX1001&paymentid=100201234567890");
        assert!(decode(&t.profile, &t.material, &ok).is_ok());

        let forged = body(&blob, "&result=VOIDED");
        assert!(decode(&t.profile, &t.material, &forged)
            .unwrap_err()
            .is_authentication_failure());
    }

    #[test]
    fn test_cleartext_only_error_never_reaches_record() {
        let t = terminal();
        let blob = seal(&t, CAPTURED);
        let raw = body(&blob, "&Error=IPAY0100263&ErrorText=Transaction+denied&udf2=injected");
        let rec = decode(&t.profile, &t.material, &raw).unwrap();
        assert_eq!(rec.error, None);
        assert_eq!(rec.error_text, None);
        assert_eq!(rec.udf(2), None);
        assert!(rec.is_approved());
    }

    #[test]
    fn test_sealed_error_reaches_record() {
        let t = terminal();
        let blob = seal(
            &t,
            &[
                ("paymentid", "1"),
                ("result", "NOT CAPTURED"),
                ("trackid", "T1"),
                ("Error", "IPAY0100263"),
                ("ErrorText", "Transaction denied"),
            ],
        );
        let raw = body(&blob, "&Error=IPAY0100263");
        let rec = decode(&t.profile, &t.material, &raw).unwrap();
        assert_eq!(rec.error.as_deref(), Some("IPAY0100263"));
        assert_eq!(rec.error_text.as_deref(), Some("Transaction denied"));

        let forged = body(&blob, "&ErrorText=All+good");
        assert!(decode(&t.profile, &t.material, &forged)
            .unwrap_err()
            .is_authentication_failure());
    }

    #[test]
    fn test_error_only_redirect() {
        let t = terminal();
        let err = decode(
            &t.profile,
            &t.material,
            b"Error=IPAY0100013&ErrorText=Invalid+tranportal+id",
        )
        .unwrap_err();
        match err {
            GatewayError::GatewayReported { code, text } => {
                assert_eq!(code, "IPAY0100013");
                assert_eq!(text, "Invalid tranportal id");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_transport_format_errors() {
        let t = terminal();
        let bodies: [&[u8]; 6] = [b"", b"   ", b"paymentid=1", b"trandata", b"a=1&a=2", b"a=1 b"];
        for raw in bodies {
            let err = decode(&t.profile, &t.material, raw).unwrap_err();
            assert!(matches!(err, GatewayError::CallbackFormat(_)), "{raw:?}: {err:?}");
        }
        let huge = vec![b'a'; MAX_CALLBACK_BYTES + 1];
        assert!(matches!(
            decode(&t.profile, &t.material, &huge).unwrap_err(),
            GatewayError::CallbackFormat(_)
        ));
    }

    #[test]
    fn test_undecryptable_payload_is_authentication_failure() {
        let t = terminal();
        for trandata in ["zz", "00", "0123456789abcdef0123456789abcdef"] {
            let err = decode(&t.profile, &t.material, &body(trandata, "")).unwrap_err();
            assert!(err.is_authentication_failure(), "{trandata}");
        }
    }

    #[test]
    fn test_wrong_key_is_authentication_failure() {
        let t = terminal();
        let other = parse_terminal(
            &TERMINAL.replace("0123456789ABCDEF", "FEDCBA9876543210"),
            "alias",
            Currency::KWD,
            Language::English,
        )
        .unwrap();
        let blob = seal(&other, CAPTURED);
        let err = decode(&t.profile, &t.material, &body(&blob, "")).unwrap_err();
        assert!(err.is_authentication_failure());
    }

    #[test]
    fn test_field_validation() {
        let t = terminal();
        let cases: &[(&str, &[(&str, &str)])] = &[
            ("paymentid", &[("result", "CAPTURED"), ("trackid", "T1")]),
            ("paymentid", &[("paymentid", "+1"), ("result", "CAPTURED"), ("trackid", "T1")]),
            ("result", &[("paymentid", "1"), ("trackid", "T1")]),
            ("trackid", &[("paymentid", "1"), ("result", "CAPTURED")]),
            ("postdate", &[("paymentid", "1"), ("result", "X"), ("trackid", "T1"), ("postdate", "1399")]),
            ("amt", &[("paymentid", "1"), ("result", "X"), ("trackid", "T1"), ("amt", "1.2345")]),
            ("tranid", &[("paymentid", "1"), ("result", "X"), ("trackid", "T1"), ("tranid", "12a")]),
            ("auth", &[("paymentid", "1"), ("result", "X"), ("trackid", "T1"), ("auth", "AB-1")]),
        ];
        for (field, pairs) in cases {
            let err = decode(&t.profile, &t.material, &body(&seal(&t, pairs), "")).unwrap_err();
            match err {
                GatewayError::FieldValidation { field: f, .. } => assert_eq!(f, *field),
                other => panic!("{field}: unexpected {other:?}"),
            }
        }
    }

    #[test]
    fn test_trim_ascii() {
        assert_eq!(trim_ascii(b"  a=1\n"), b"a=1");
        assert_eq!(trim_ascii(b" \t "), b"");
        assert_eq!(trim_ascii(b""), b"");
    }
}
