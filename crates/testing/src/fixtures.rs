//! Test fixtures for method paths and handler outcomes.

use fake::{faker::lorem::en::Word, Fake};
use std::time::Duration;
use tonic::Status;

/// Fully qualified method used by most tests
pub const TEST_FULL_METHOD: &str = "/foo.Bar/Baz";

/// Build a `/<package>.<Service>/<Method>` path from random words
pub fn fake_full_method() -> (String, String, String) {
    let package: String = Word().fake();
    let service: String = Word().fake();
    let method: String = Word().fake();

    let service = format!("{}.{}", package, capitalize(&service));
    let method = capitalize(&method);
    let full_method = format!("/{}/{}", service, method);

    (full_method, service, method)
}

/// Handler that sleeps and then returns `response`
pub async fn slow_handler<T>(delay: Duration, response: T) -> Result<T, Status> {
    tokio::time::sleep(delay).await;
    Ok(response)
}

/// Handler that fails right away with `status`
pub async fn failing_handler<T>(status: Status) -> Result<T, Status> {
    Err(status)
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
