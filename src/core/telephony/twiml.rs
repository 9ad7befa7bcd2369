//! Call-setup markup returned to the telephony provider on an inbound call.

use quick_xml::escape::escape;

/// Path the provider connects to for the bidirectional media stream.
pub const MEDIA_STREAM_PATH: &str = "/media-stream";

/// Build the TwiML document that connects the call to the media stream endpoint.
///
/// `stream_url` must already be a `wss://` URL. The optional greeting is spoken
/// to the caller before the stream is connected.
pub fn connect_stream_twiml(stream_url: &str, greeting: Option<&str>) -> String {
    let mut twiml = String::from(r#"<?xml version="1.0" encoding="UTF-8"?><Response>"#);

    if let Some(greeting) = greeting.filter(|g| !g.trim().is_empty()) {
        twiml.push_str("<Say>");
        twiml.push_str(&escape(greeting));
        twiml.push_str("</Say>");
    }

    twiml.push_str(r#"<Connect><Stream url=""#);
    twiml.push_str(&escape(stream_url));
    twiml.push_str(r#"" /></Connect></Response>"#);
    twiml
}
