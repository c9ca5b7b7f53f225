use std::future::Future;
use std::time::Duration;

use roxmltree::{Document, Node};

use crate::color::Frame;
use crate::config::Plex;
use crate::error::SyncError;

/// What is on screen right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackSession {
    pub video_id: i64,
    pub offset_ms: u64,
}

pub trait MediaServer {
    /// `None` when nothing is playing or the server could not be read.
    fn current_session(&self) -> impl Future<Output = Option<PlaybackSession>> + Send;

    fn fetch_frame(
        &self,
        session: &PlaybackSession,
        look_ahead: Duration,
    ) -> impl Future<Output = Result<Frame, SyncError>> + Send;
}

fn child<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    node.children().find(|n| n.is_element() && n.tag_name().name() == name)
}

/// Reads the first playing video out of a `/status/sessions` response.
///
/// `Ok(None)` means the document was fine but nothing is playing.
pub fn parse_session(xml: &str) -> Result<Option<PlaybackSession>, SyncError> {
    let doc = Document::parse(xml)?;
    let Some(video) = child(doc.root_element(), "Video") else {
        return Ok(None);
    };

    let part_id = child(video, "Media")
        .and_then(|media| child(media, "Part"))
        .and_then(|part| part.attribute("id"));
    let Some(part_id) = part_id else {
        return Ok(None);
    };

    let video_id: i64 = part_id
        .trim()
        .parse()
        .map_err(|_| SyncError::Parse(format!("part id '{}' is not a number", part_id)))?;
    if video_id <= 0 {
        return Ok(None);
    }

    let offset_ms = match video.attribute("viewOffset") {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| SyncError::Parse(format!("viewOffset '{}' is not a number", raw)))?,
        None => 0,
    };

    Ok(Some(PlaybackSession { video_id, offset_ms }))
}

pub struct PlexServer {
    client: reqwest::Client,
    base_url: String,
    token: String,
    frame_width: u32,
    frame_height: u32,
}

impl PlexServer {
    pub fn new(cfg: &Plex) -> Result<Self, SyncError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(cfg.timeout_ms))
            .build()
            .map_err(|e| SyncError::Configuration(e.to_string()))?;

        Ok(Self {
            client,
            base_url: cfg.url.trim_end_matches('/').to_string(),
            token: cfg.token.clone(),
            frame_width: cfg.frame_width,
            frame_height: cfg.frame_height,
        })
    }

    /// Path of the preview index the transcoder renders from.
    fn index_path(&self, session: &PlaybackSession, look_ahead: Duration) -> String {
        let look_ahead = u64::try_from(look_ahead.as_millis()).unwrap_or(u64::MAX);
        let at = session.offset_ms.saturating_add(look_ahead);
        format!(
            "/library/parts/{}/indexes/sd/{}?X-Plex-Token={}",
            session.video_id,
            at,
            urlencoding::encode(&self.token)
        )
    }

    async fn sessions_xml(&self) -> Result<String, SyncError> {
        let resp = self
            .client
            .get(format!("{}/status/sessions", self.base_url))
            .query(&[("X-Plex-Token", self.token.as_str())])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(SyncError::Transport(format!("sessions request failed with status {}", status)));
        }
        Ok(resp.text().await?)
    }
}

impl MediaServer for PlexServer {
    async fn current_session(&self) -> Option<PlaybackSession> {
        let xml = match self.sessions_xml().await {
            Ok(xml) => xml,
            Err(e) => {
                tracing::error!(error = %e, "failed to query plex sessions");
                return None;
            }
        };

        match parse_session(&xml) {
            Ok(Some(session)) => {
                tracing::info!(video_id = session.video_id, offset_ms = session.offset_ms, "retrieved video information");
                Some(session)
            }
            Ok(None) => {
                tracing::debug!("nothing playing");
                None
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to parse plex sessions");
                None
            }
        }
    }

    async fn fetch_frame(&self, session: &PlaybackSession, look_ahead: Duration) -> Result<Frame, SyncError> {
        let width = self.frame_width.to_string();
        let height = self.frame_height.to_string();
        let index = self.index_path(session, look_ahead);

        let resp = self
            .client
            .get(format!("{}/photo/:/transcode", self.base_url))
            .query(&[
                ("X-Plex-Token", self.token.as_str()),
                ("width", width.as_str()),
                ("height", height.as_str()),
                ("minSize", "1"),
                ("url", index.as_str()),
            ])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(SyncError::Transport(format!("transcode request failed with status {}", status)));
        }

        let bytes = resp.bytes().await?;
        let frame = Frame::decode(&bytes)?;
        tracing::debug!(width = frame.width(), height = frame.height(), "got new frame");
        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plex(token: &str) -> PlexServer {
        PlexServer::new(&Plex {
            url: "http://plex.local:32400/".into(),
            token: token.into(),
            frame_width: 700,
            frame_height: 394,
            look_ahead_ms: 2000,
            timeout_ms: 1000,
        })
        .unwrap()
    }

    #[test]
    fn parses_the_playing_part_and_offset() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<MediaContainer size="1">
  <Video ratingKey="9" title="Film" viewOffset="10000">
    <Media id="3" videoResolution="1080">
      <Part id="42" file="/media/film.mkv"/>
    </Media>
    <Player state="playing"/>
  </Video>
</MediaContainer>"#;

        let session = parse_session(xml).unwrap();
        assert_eq!(session, Some(PlaybackSession { video_id: 42, offset_ms: 10000 }));
    }

    #[test]
    fn empty_container_means_nothing_playing() {
        assert_eq!(parse_session(r#"<MediaContainer size="0"/>"#).unwrap(), None);
    }

    #[test]
    fn non_positive_part_id_means_nothing_playing() {
        let xml = r#"<MediaContainer><Video viewOffset="5"><Media><Part id="0"/></Media></Video></MediaContainer>"#;
        assert_eq!(parse_session(xml).unwrap(), None);
    }

    #[test]
    fn music_sessions_are_ignored() {
        let xml = r#"<MediaContainer><Track viewOffset="5"><Media><Part id="8"/></Media></Track></MediaContainer>"#;
        assert_eq!(parse_session(xml).unwrap(), None);
    }

    #[test]
    fn garbage_is_a_parse_error() {
        assert!(matches!(parse_session("<MediaContainer"), Err(SyncError::Parse(_))));
        let xml = r#"<MediaContainer><Video viewOffset="soon"><Media><Part id="4"/></Media></Video></MediaContainer>"#;
        assert!(matches!(parse_session(xml), Err(SyncError::Parse(_))));
    }

    #[test]
    fn index_path_applies_look_ahead_and_escapes_token() {
        let server = plex("a&b");
        let session = PlaybackSession { video_id: 42, offset_ms: 10000 };
        assert_eq!(
            server.index_path(&session, Duration::from_millis(2000)),
            "/library/parts/42/indexes/sd/12000?X-Plex-Token=a%26b"
        );
        assert_eq!(server.base_url, "http://plex.local:32400");
    }

    #[test]
    fn huge_view_offset_saturates_instead_of_overflowing() {
        let xml = r#"<MediaContainer><Video viewOffset="18446744073709551615"><Media><Part id="4"/></Media></Video></MediaContainer>"#;
        let session = parse_session(xml).unwrap().unwrap();
        assert_eq!(session.offset_ms, u64::MAX);
        assert_eq!(
            plex("t").index_path(&session, Duration::from_millis(2000)),
            format!("/library/parts/4/indexes/sd/{}?X-Plex-Token=t", u64::MAX)
        );
    }
}
