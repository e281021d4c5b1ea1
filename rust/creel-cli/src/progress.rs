//! Console rendering of upload progress.

use creel_client::{ProgressSink, UploadEvent};

/// Prints upload progress to stdout, one line per event.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleProgress;

impl ProgressSink for ConsoleProgress {
    fn emit(&self, event: UploadEvent) {
        match event {
            UploadEvent::Digested { digest, size } => {
                println!("digest {digest} ({size} bytes)");
            }
            UploadEvent::AlreadyStored { provider, digest } => {
                println!("skipping upload, {provider} already has {digest}");
            }
            UploadEvent::Uploading {
                provider,
                digest,
                url,
            } => {
                println!("uploading {digest} to {provider} ({url})");
            }
            UploadEvent::SubmittingReceipt => {
                println!("issuing receipt for completed \"/http/put\" task");
            }
            UploadEvent::AwaitingAcceptance { task } => {
                println!("awaiting site from \"/blob/accept\" task: {task}");
            }
            UploadEvent::LocationCommitted {
                commitment,
                locations,
            } => {
                println!("location commitment: {commitment}");
                for location in locations {
                    println!("blob location: {location}");
                }
            }
        }
    }
}
