use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use showfeed_client::{
    ClientConfig, ClientError, GatewayError, LikeToggle, Registration, SessionStore,
    ShowfeedClient,
};

fn unique_suffix() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock must be after unix epoch")
        .as_nanos();
    format!("{nanos}")
}

fn live_client() -> ShowfeedClient {
    let base_url = std::env::var("SHOWFEED_API_URL")
        .unwrap_or_else(|_| "http://127.0.0.1:5000/api/mobile".to_string());
    ShowfeedClient::new(
        ClientConfig::new(base_url),
        Arc::new(SessionStore::in_memory()),
    )
    .expect("client must build")
}

#[tokio::test]
#[ignore = "requires running performance backend"]
async fn live_feed_and_like_flow() {
    let client = live_client();

    let suffix = unique_suffix();
    let username = format!("smoke_{suffix}");
    let password = "password123";

    let registered = client
        .register(&Registration {
            username: username.clone(),
            password: password.to_string(),
            name: "Smoke".to_string(),
            email: format!("smoke_{suffix}@example.com"),
            phone: None,
        })
        .await
        .expect("register must succeed");
    assert_eq!(
        registered.user().map(|user| user.username.as_str()),
        Some(username.as_str())
    );

    let logged_in = client
        .login(&username, password)
        .await
        .expect("login must succeed");
    assert!(logged_in.user().is_some());

    let mut feed = client.feed();
    let first = feed.reload();
    feed.drive(&client, first)
        .await
        .expect("first page must load");
    if feed.has_next() {
        let more = feed.load_more().expect("second page must be requested");
        feed.drive(&client, more)
            .await
            .expect("second page must load");
        assert_eq!(feed.page(), 2);
    }

    let Some(first_event) = feed.items().first().cloned() else {
        return;
    };
    let mut detail = client
        .get_performance(first_event.id)
        .await
        .expect("detail must load");
    assert_eq!(detail.id(), first_event.id);

    let mut toggle = LikeToggle::new();
    match toggle.toggle(&client, &mut detail).await {
        Ok(outcome) => {
            let outcome = outcome.expect("tap must not be ignored");
            assert_eq!(detail.summary.likes, outcome.likes_count);
        }
        Err(GatewayError::Unauthorized { .. }) => {
            assert!(client.current_user().is_none());
        }
        Err(err) => panic!("unexpected like failure: {err}"),
    }

    client.logout().expect("logout must succeed");
    assert!(client.current_user().is_none());

    let wrong = client.login(&username, "wrong-password").await;
    assert!(matches!(wrong, Err(ClientError::AuthFailed(_))));
}
