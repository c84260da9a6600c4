// Diesel table definitions. Must match the CREATE TABLE statements in
// repository/migrations.rs.

diesel::table! {
    documents (id) {
        id -> Text,
        source_path -> Text,
        filename -> Text,
        content_hash -> Text,
        file_size -> BigInt,
        document_type -> Nullable<Text>,
        extracted_text -> Nullable<Text>,
        extraction_method -> Nullable<Text>,
        page_count -> Nullable<Integer>,
        classification_confidence -> Nullable<Double>,
        classification_method -> Nullable<Text>,
        chunk_count -> Nullable<Integer>,
        extraction_status -> Text,
        classification_status -> Text,
        metadata_status -> Text,
        chunking_status -> Text,
        last_error -> Nullable<Text>,
        created_at -> Text,
        updated_at -> Text,
    }
}

diesel::table! {
    structured_records (table_name, document_id) {
        table_name -> Text,
        document_id -> Text,
        data -> Text,
        saved_at -> Text,
    }
}

diesel::table! {
    document_chunks (document_id, chunk_index) {
        document_id -> Text,
        chunk_index -> Integer,
        content -> Text,
        char_count -> Integer,
    }
}

diesel::joinable!(structured_records -> documents (document_id));
diesel::joinable!(document_chunks -> documents (document_id));

diesel::allow_tables_to_appear_in_same_query!(documents, structured_records, document_chunks,);
