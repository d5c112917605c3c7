// Handler registration shapes.
//
// Four call signatures are normalised onto a single internal shape
// `(bytes) -> Result<bytes>`, with a small adapter builder per arity that
// performs the decode/encode a particular shape needs. The `void(Req)`
// shape calls `func(req)` — passing the decoded request through to the
// callback rather than discarding it.

use crate::codec;
use crate::error::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;

pub type RawHandler = Box<dyn Fn(&[u8]) -> Result<Vec<u8>> + Send + Sync>;

/// `Resp(Req)`
pub fn req_resp<Req, Resp, F>(f: F) -> RawHandler
where
    Req: DeserializeOwned,
    Resp: Serialize,
    F: Fn(Req) -> Result<Resp> + Send + Sync + 'static,
{
    Box::new(move |bytes: &[u8]| {
        let req: Req = codec::decode(bytes)?;
        let resp = f(req)?;
        codec::encode(&resp)
    })
}

/// `void(Req)`
pub fn req_void<Req, F>(f: F) -> RawHandler
where
    Req: DeserializeOwned,
    F: Fn(Req) -> Result<()> + Send + Sync + 'static,
{
    Box::new(move |bytes: &[u8]| {
        let req: Req = codec::decode(bytes)?;
        f(req)?;
        Ok(Vec::new())
    })
}

/// `Resp()`
pub fn resp<Resp, F>(f: F) -> RawHandler
where
    Resp: Serialize,
    F: Fn() -> Result<Resp> + Send + Sync + 'static,
{
    Box::new(move |_bytes: &[u8]| {
        let resp = f()?;
        codec::encode(&resp)
    })
}

/// `void()`
pub fn void<F>(f: F) -> RawHandler
where
    F: Fn() -> Result<()> + Send + Sync + 'static,
{
    Box::new(move |_bytes: &[u8]| {
        f()?;
        Ok(Vec::new())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn req_resp_round_trips_through_codec() {
        let handler = req_resp(|req: String| Ok(format!("Echo: {req}")));
        let payload = codec::encode(&"hello".to_string()).unwrap();
        let out = handler(&payload).unwrap();
        let decoded: String = codec::decode(&out).unwrap();
        assert_eq!(decoded, "Echo: hello");
    }

    #[test]
    fn void_handler_ignores_payload_and_returns_empty() {
        let handler = void(|| Ok(()));
        let out = handler(&[]).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn req_void_calls_func_with_the_request_not_unit() {
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::sync::Arc;

        let saw_value = Arc::new(AtomicBool::new(false));
        let saw_value2 = saw_value.clone();
        let handler = req_void(move |req: u32| {
            if req == 7 {
                saw_value2.store(true, Ordering::SeqCst);
            }
            Ok(())
        });
        let payload = codec::encode(&7u32).unwrap();
        handler(&payload).unwrap();
        assert!(saw_value.load(Ordering::SeqCst));
    }
}
