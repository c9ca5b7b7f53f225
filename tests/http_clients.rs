use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{StatusCode, Uri, header},
    response::IntoResponse,
    routing::{get, put},
};
use image::{ImageFormat, Rgb, RgbImage};
use lumasync::color::{Color, ColorStrategy};
use lumasync::config::{Bridge, Plex};
use lumasync::engine::{PollOutcome, Settings, SyncLoop};
use lumasync::error::SyncError;
use lumasync::hue::{HueBridge, LightBridge, LightState};
use lumasync::plex::{MediaServer, PlaybackSession, PlexServer};
use serde_json::Value;

const TOKEN: &str = "secret-token";

const SESSIONS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<MediaContainer size="1">
  <Video key="/library/metadata/9" viewOffset="10000">
    <Media id="5"><Part id="42" key="/library/parts/42/file.mkv"/></Media>
  </Video>
</MediaContainer>"#;

#[derive(Clone, Default)]
struct Recorded {
    transcode_queries: Arc<Mutex<Vec<HashMap<String, String>>>>,
    light_puts: Arc<Mutex<Vec<(String, u32, Value)>>>,
}

async fn spawn(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

fn png(color: Color) -> Vec<u8> {
    let img = RgbImage::from_pixel(16, 9, Rgb([color.r, color.g, color.b]));
    let mut bytes = Vec::new();
    img.write_to(&mut std::io::Cursor::new(&mut bytes), ImageFormat::Png).unwrap();
    bytes
}

async fn fake_plex(sessions: &'static str, frame: Option<Color>, rec: Recorded) -> String {
    // "/photo/:/transcode" is not expressible as a route, so it is matched in the fallback
    let transcode = move |State(rec): State<Recorded>, uri: Uri, Query(q): Query<HashMap<String, String>>| async move {
        if uri.path() != "/photo/:/transcode" {
            return StatusCode::NOT_FOUND.into_response();
        }
        rec.transcode_queries.lock().unwrap().push(q);
        match frame {
            Some(color) => ([(header::CONTENT_TYPE, "image/png")], png(color)).into_response(),
            None => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        }
    };

    let router = Router::new()
        .route(
            "/status/sessions",
            get(move |Query(q): Query<HashMap<String, String>>| async move {
                if q.get("X-Plex-Token").map(String::as_str) != Some(TOKEN) {
                    return (StatusCode::UNAUTHORIZED, String::new()).into_response();
                }
                ([(header::CONTENT_TYPE, "text/xml")], sessions).into_response()
            }),
        )
        .fallback(transcode)
        .with_state(rec);
    spawn(router).await
}

async fn fake_hue(rec: Recorded, failing_light: Option<u32>) -> String {
    let router = Router::new()
        .route(
            "/api/:user/lights/:id/state",
            put(
                move |State(rec): State<Recorded>, Path((user, id)): Path<(String, u32)>, Json(body): Json<Value>| async move {
                    rec.light_puts.lock().unwrap().push((user, id, body));
                    if Some(id) == failing_light {
                        return StatusCode::NOT_FOUND;
                    }
                    StatusCode::OK
                },
            ),
        )
        .with_state(rec);
    spawn(router).await
}

fn plex_config(url: &str) -> Plex {
    Plex {
        url: url.to_string(),
        token: TOKEN.to_string(),
        frame_width: 700,
        frame_height: 394,
        look_ahead_ms: 2000,
        timeout_ms: 2000,
    }
}

fn bridge_config(url: &str, lights: Vec<u32>) -> Bridge {
    Bridge {
        url: url.to_string(),
        user: "hueuser".to_string(),
        lights,
        timeout_ms: 2000,
    }
}

#[tokio::test]
async fn reads_the_session_and_fetches_a_look_ahead_frame() {
    let rec = Recorded::default();
    let url = fake_plex(SESSIONS, Some(Color::new(10, 20, 30)), rec.clone()).await;
    let plex = PlexServer::new(&plex_config(&url)).unwrap();

    let session = plex.current_session().await.unwrap();
    assert_eq!(session, PlaybackSession { video_id: 42, offset_ms: 10000 });

    let frame = plex.fetch_frame(&session, Duration::from_millis(2000)).await.unwrap();
    assert_eq!((frame.width(), frame.height()), (16, 9));
    assert_eq!(frame.pixel(3, 3), Color::new(10, 20, 30));

    let queries = rec.transcode_queries.lock().unwrap().clone();
    assert_eq!(queries.len(), 1);
    let q = &queries[0];
    assert_eq!(q["X-Plex-Token"], TOKEN);
    assert_eq!(q["width"], "700");
    assert_eq!(q["height"], "394");
    assert_eq!(q["minSize"], "1");
    assert_eq!(q["url"], format!("/library/parts/42/indexes/sd/12000?X-Plex-Token={}", TOKEN));
}

#[tokio::test]
async fn nothing_playing_and_bad_xml_both_read_as_not_playing() {
    let idle = fake_plex(r#"<MediaContainer size="0"></MediaContainer>"#, None, Recorded::default()).await;
    assert_eq!(PlexServer::new(&plex_config(&idle)).unwrap().current_session().await, None);

    let broken = fake_plex("<MediaContainer><Video", None, Recorded::default()).await;
    assert_eq!(PlexServer::new(&plex_config(&broken)).unwrap().current_session().await, None);
}

#[tokio::test]
async fn unreachable_server_reads_as_not_playing() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let plex = PlexServer::new(&plex_config(&url)).unwrap();
    assert_eq!(plex.current_session().await, None);
    let session = PlaybackSession { video_id: 1, offset_ms: 0 };
    assert!(matches!(
        plex.fetch_frame(&session, Duration::ZERO).await,
        Err(SyncError::Transport(_))
    ));
}

#[tokio::test]
async fn transcode_failure_is_a_transport_error() {
    let url = fake_plex(SESSIONS, None, Recorded::default()).await;
    let plex = PlexServer::new(&plex_config(&url)).unwrap();
    let session = plex.current_session().await.unwrap();

    assert!(matches!(
        plex.fetch_frame(&session, Duration::from_millis(2000)).await,
        Err(SyncError::Transport(_))
    ));
}

#[tokio::test]
async fn bridge_receives_partial_state_updates() {
    let rec = Recorded::default();
    let url = fake_hue(rec.clone(), None).await;
    let bridge = HueBridge::new(&bridge_config(&url, vec![6])).unwrap();

    bridge.set_state(6, &LightState::from_color(Color::new(255, 0, 0))).await.unwrap();
    bridge.set_state(6, &LightState::from_color(Color::BLACK)).await.unwrap();

    let puts = rec.light_puts.lock().unwrap().clone();
    assert_eq!(puts[0].0, "hueuser");
    assert_eq!(puts[0].2, serde_json::json!({ "on": true, "hue": 0, "sat": 254, "bri": 254 }));
    assert_eq!(puts[1].2, serde_json::json!({ "on": false }));
}

#[tokio::test]
async fn bridge_error_status_is_reported() {
    let url = fake_hue(Recorded::default(), Some(9)).await;
    let bridge = HueBridge::new(&bridge_config(&url, vec![9])).unwrap();

    let result = bridge.set_state(9, &LightState::OFF).await;
    assert!(matches!(result, Err(SyncError::Transport(_))));
}

#[tokio::test]
async fn one_poll_end_to_end() {
    let rec = Recorded::default();
    let plex_url = fake_plex(SESSIONS, Some(Color::new(10, 20, 30)), rec.clone()).await;
    let hue_url = fake_hue(rec.clone(), Some(7)).await;

    let plex = PlexServer::new(&plex_config(&plex_url)).unwrap();
    let bridge = HueBridge::new(&bridge_config(&hue_url, vec![6, 7, 8])).unwrap();
    let settings = Settings {
        lights: vec![6, 7, 8],
        steps: 4,
        transition: Duration::from_millis(40),
        idle_delay: Duration::from_millis(40),
        look_ahead: Duration::from_millis(2000),
        strategy: ColorStrategy::Histogram,
        buckets: 128,
    };
    let (mut sync, handle) = SyncLoop::new(plex, bridge, settings).unwrap();
    handle.arm();

    let outcome = sync.poll_once().await;
    assert_eq!(outcome, PollOutcome::Updated { color: Color::new(10, 20, 30), dispatched: 4 });

    let puts = rec.light_puts.lock().unwrap().clone();
    // light 7 fails every time but 6 and 8 still get all four steps
    assert_eq!(puts.len(), 12);
    let light_8: Vec<&Value> = puts.iter().filter(|(_, id, _)| *id == 8).map(|(_, _, b)| b).collect();
    assert_eq!(light_8.len(), 4);
    assert_eq!(*light_8[0], serde_json::json!({ "on": false }));
    assert_eq!(
        *light_8[3],
        serde_json::to_value(LightState::from_color(Color::new(8, 15, 23))).unwrap()
    );
    assert_eq!(handle.last_color(), Color::new(10, 20, 30));
}
