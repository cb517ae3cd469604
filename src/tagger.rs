//! The tagging boundary (C9): consumed as a pure function from `Torrent`
//! to a set of tag names. Regex-based filename classification is an
//! external collaborator; `NoopTagger` is a reference implementation
//! that tags nothing.
use crate::torrent::Torrent;

pub trait Tagger: Send + Sync {
    fn tag(&self, torrent: &Torrent) -> Vec<String>;
}

pub struct NoopTagger;

impl Tagger for NoopTagger {
    fn tag(&self, _torrent: &Torrent) -> Vec<String> {
        Vec::new()
    }
}
