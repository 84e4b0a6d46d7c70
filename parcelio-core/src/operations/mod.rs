pub mod delete_object;
pub mod download_object;
pub mod upload_object;

pub use delete_object::{
    DeleteObjectOperation, DeleteObjectOperationOutcome, DeleteObjectOperationRequest,
    DeleteObjectOperationResult,
};
pub use download_object::{
    DownloadObjectOperation, DownloadObjectOperationOutcome, DownloadObjectOperationRequest,
    ObjectDownload,
};
pub use upload_object::{
    UploadObjectOperation, UploadObjectOperationOutcome, UploadObjectOperationRequest,
    UploadObjectOperationResult, normalize_name,
};
