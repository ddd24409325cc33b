use std::sync::Arc;

use postboard_db::Database;

use crate::assets::AssetValidator;
use crate::transcribe::Transcriber;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub assets: AssetValidator,
    pub transcriber: Arc<dyn Transcriber>,
}
