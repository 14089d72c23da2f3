use actix_session::Session;
use rand::Rng;

const FLASH_KEY: &str = "flash";

/// Synthesizes a 16-digit card token. Not a real PAN; the digits come from
/// whatever RNG the caller supplies, so tests can pin the sequence.
pub fn generate_card_token(rng: &mut impl Rng) -> String {
    (0..16)
        .map(|_| char::from(b'0' + rng.gen_range(0u8..10)))
        .collect()
}

/// Queues a status message for the next rendered page.
pub fn flash(session: &Session, message: &str) {
    let mut messages: Vec<String> = session.get(FLASH_KEY).ok().flatten().unwrap_or_default();
    messages.push(message.to_owned());
    if let Err(e) = session.insert(FLASH_KEY, &messages) {
        log::error!("Failed to store flash message: {}", e);
    }
}

/// Drains queued status messages for display.
pub fn take_flashes(session: &Session) -> Vec<String> {
    let messages: Vec<String> = session.get(FLASH_KEY).ok().flatten().unwrap_or_default();
    session.remove(FLASH_KEY);
    messages
}
