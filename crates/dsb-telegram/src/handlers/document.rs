use std::sync::Arc;

use teloxide::{prelude::*, types::Document};

use dsb_core::{
    domain::{ChatId, IncomingFile, Provenance},
    messaging::{notifier::Notifier, types::ChatAction},
};

use crate::router::AppState;

/// Build the core boundary struct from a Telegram document.
pub(crate) fn incoming_file(doc: &Document) -> IncomingFile {
    IncomingFile {
        name: doc
            .file_name
            .clone()
            .unwrap_or_else(|| "document".to_string()),
        size: doc.file.size as u64,
        provenance: Provenance::DirectUpload,
        provenance_ref: doc.file.id.clone(),
    }
}

pub async fn handle_document(
    doc: &Document,
    chat_id: i64,
    state: Arc<AppState>,
) -> ResponseResult<()> {
    let file = incoming_file(doc);
    let notifier = Notifier::new(state.messenger.clone(), ChatId(chat_id));

    tracing::info!(chat_id, file = %file.name, size = file.size, "document received");
    if state.indexer.validate(&file).is_ok() {
        notifier.action(ChatAction::Typing).await;
    }

    state
        .indexer
        .ingest_and_notify(file, state.upload_source.as_ref(), &notifier)
        .await;

    Ok(())
}
