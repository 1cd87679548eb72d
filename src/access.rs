pub const GLOBUS_FILE_MANAGER: &str = "https://app.globus.org/file-manager";

pub fn build_url(collection_id: &str, request_token: &str) -> String {
    build_url_with(GLOBUS_FILE_MANAGER, collection_id, request_token)
}

pub fn build_url_with(file_manager_url: &str, collection_id: &str, request_token: &str) -> String {
    format!(
        "{file_manager_url}?origin_id={collection_id}&origin_path={request_token}&two_pane=true"
    )
}
