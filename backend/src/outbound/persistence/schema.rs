//! Diesel table definitions for the linking schema.
//!
//! These definitions must match `migrations/` exactly. Status, role and
//! relationship columns are `Varchar` holding the storage form of the domain
//! enums; check constraints in the migration keep them closed.

diesel::table! {
    /// Registered accounts.
    users (id) {
        id -> Uuid,
        /// Normalised (trimmed, lower-case) login email. Unique.
        email -> Varchar,
        /// Handle derived from the email local part. Unique.
        username -> Varchar,
        first_name -> Nullable<Varchar>,
        last_name -> Nullable<Varchar>,
        display_name -> Varchar,
        /// PHC string produced by the password hasher.
        password_hash -> Varchar,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    /// Co-parent invitations.
    invitations (id) {
        id -> Uuid,
        /// SHA-256 hex of the raw token. Unique.
        token_hash -> Varchar,
        short_code -> Varchar,
        inviter_id -> Uuid,
        invitee_email -> Varchar,
        invitee_id -> Nullable<Uuid>,
        invitation_type -> Varchar,
        status -> Varchar,
        created_at -> Timestamptz,
        expires_at -> Timestamptz,
        accepted_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    /// Legacy email connection requests.
    pending_connections (id) {
        id -> Uuid,
        inviter_id -> Uuid,
        invitee_email -> Varchar,
        token_hash -> Varchar,
        status -> Varchar,
        created_at -> Timestamptz,
        expires_at -> Timestamptz,
        accepted_by -> Nullable<Uuid>,
        accepted_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    rooms (id) {
        id -> Uuid,
        name -> Varchar,
        created_by -> Uuid,
        is_private -> Bool,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    /// Membership rows; one per (room, user).
    room_members (room_id, user_id) {
        room_id -> Uuid,
        user_id -> Uuid,
        role -> Varchar,
        joined_at -> Timestamptz,
    }
}

diesel::table! {
    /// Single-use room invite codes.
    room_invites (id) {
        id -> Uuid,
        room_id -> Uuid,
        invited_by -> Uuid,
        invite_code -> Varchar,
        created_at -> Timestamptz,
        expires_at -> Timestamptz,
        used_by -> Nullable<Uuid>,
        used_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    /// Per-user contact lists.
    contacts (id) {
        id -> Uuid,
        user_id -> Uuid,
        contact_name -> Varchar,
        contact_email -> Nullable<Varchar>,
        /// `NULL` for placeholder contacts shared from a co-parent.
        relationship -> Nullable<Varchar>,
        linked_user_id -> Nullable<Uuid>,
        notes -> Nullable<Text>,
        created_at -> Timestamptz,
    }
}

diesel::joinable!(room_members -> rooms (room_id));
diesel::joinable!(room_invites -> rooms (room_id));

diesel::allow_tables_to_appear_in_same_query!(
    users,
    invitations,
    pending_connections,
    rooms,
    room_members,
    room_invites,
    contacts,
);
