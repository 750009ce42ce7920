/// Generates a new opaque identifier (UUID v4, simple format).
pub fn generate_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}
