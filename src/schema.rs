diesel::table! {
    person (id) {
        id -> Uuid,
        name -> Text,
        email -> Text,
        roles -> Array<Text>,
        api_key_prefix -> Nullable<Text>,
        api_key_hash -> Nullable<Text>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    sample (id) {
        id -> Uuid,
        sample_id -> Text,
        name -> Text,
        sample_type -> Text,
        description -> Text,
        source -> Text,
        donor_info -> Text,
        storage_location -> Text,
        status -> Text,
        quantity -> Float8,
        passage_number -> Nullable<Int4>,
        collection_date -> Nullable<Date>,
        storage_date -> Date,
        expiration_date -> Nullable<Date>,
        viability -> Nullable<Float8>,
        quality_control_notes -> Text,
        research_use_only -> Bool,
        image_path -> Nullable<Text>,
        created_by -> Nullable<Uuid>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    sample_history (id) {
        id -> Uuid,
        sample_id -> Uuid,
        revision -> Int4,
        change_kind -> Text,
        actor_id -> Nullable<Uuid>,
        changed_at -> Timestamptz,
        snapshot -> Jsonb,
    }
}

diesel::table! {
    site_settings (key) {
        key -> Text,
        site_name_en -> Text,
        site_name_zh_hant -> Text,
        site_name_zh_hans -> Text,
        logo_path -> Nullable<Text>,
        updated_at -> Timestamptz,
    }
}

diesel::joinable!(sample -> person (created_by));

diesel::allow_tables_to_appear_in_same_query!(person, sample, sample_history, site_settings);
