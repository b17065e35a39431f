use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, query, query_as, Error as SqlxError, PgPool};

use super::{
    Database, DatabaseError, DatabaseResult, IntoDatabaseError, MessageData, NewMessage, NewRoom,
    NewUser, NewVideo, PrimaryKey, Result, RoomData, UserData, VideoData,
};

/// A postgres database implementation for lockstep
pub struct PgDatabase {
    pool: PgPool,
}

impl PgDatabase {
    pub async fn new(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(url)
            .await
            .map_err(|e| DatabaseError::Internal(Box::new(e)))?;

        Ok(Self { pool })
    }
}

#[async_trait]
impl Database for PgDatabase {
    async fn room_by_id(&self, room_id: PrimaryKey) -> Result<RoomData> {
        query_as::<_, RoomData>("SELECT * FROM rooms WHERE id = $1")
            .bind(room_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.not_found_or("room", "id"))
    }

    async fn list_rooms(&self) -> Result<Vec<RoomData>> {
        query_as::<_, RoomData>("SELECT * FROM rooms ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| e.any())
    }

    async fn create_room(&self, new_room: NewRoom) -> Result<RoomData> {
        query_as::<_, RoomData>(
            "INSERT INTO rooms (name, secret, active, host_only_control)
             VALUES ($1, $2, true, false)
             RETURNING *",
        )
        .bind(new_room.name)
        .bind(new_room.secret)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.any())
    }

    async fn set_room_host_only_control(
        &self,
        room_id: PrimaryKey,
        host_only_control: bool,
    ) -> Result<RoomData> {
        query_as::<_, RoomData>(
            "UPDATE rooms SET host_only_control = $1 WHERE id = $2 RETURNING *",
        )
        .bind(host_only_control)
        .bind(room_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.not_found_or("room", "id"))
    }

    async fn user_by_id(&self, user_id: PrimaryKey) -> Result<UserData> {
        query_as::<_, UserData>("SELECT * FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.not_found_or("user", "id"))
    }

    async fn users_by_room(&self, room_id: PrimaryKey) -> Result<Vec<UserData>> {
        query_as::<_, UserData>("SELECT * FROM users WHERE room_id = $1 ORDER BY id")
            .bind(room_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| e.any())
    }

    async fn create_user(&self, new_user: NewUser) -> Result<UserData> {
        query_as::<_, UserData>(
            "INSERT INTO users (username, room_id, is_host)
             VALUES ($1, $2, $3)
             RETURNING *",
        )
        .bind(new_user.username)
        .bind(new_user.room_id)
        .bind(new_user.is_host)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.any())
    }

    async fn update_username(&self, user_id: PrimaryKey, username: &str) -> Result<UserData> {
        query_as::<_, UserData>("UPDATE users SET username = $1 WHERE id = $2 RETURNING *")
            .bind(username)
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.not_found_or("user", "id"))
    }

    async fn delete_user(&self, user_id: PrimaryKey) -> Result<()> {
        // Ensure user exists
        let _ = self.user_by_id(user_id).await?;

        query("DELETE FROM users WHERE id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())
            .map(|_| ())
    }

    async fn messages_by_room(&self, room_id: PrimaryKey) -> Result<Vec<MessageData>> {
        query_as::<_, MessageData>("SELECT * FROM messages WHERE room_id = $1 ORDER BY id")
            .bind(room_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| e.any())
    }

    async fn create_message(&self, new_message: NewMessage) -> Result<MessageData> {
        query_as::<_, MessageData>(
            "INSERT INTO messages (content, user_id, room_id)
             VALUES ($1, $2, $3)
             RETURNING *",
        )
        .bind(new_message.content)
        .bind(new_message.user_id)
        .bind(new_message.room_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.any())
    }

    async fn video_by_id(&self, video_id: PrimaryKey) -> Result<VideoData> {
        query_as::<_, VideoData>("SELECT * FROM videos WHERE id = $1")
            .bind(video_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.not_found_or("video", "id"))
    }

    async fn videos_by_room(&self, room_id: PrimaryKey) -> Result<Vec<VideoData>> {
        query_as::<_, VideoData>("SELECT * FROM videos WHERE room_id = $1 ORDER BY id")
            .bind(room_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| e.any())
    }

    async fn video_by_info_hash(&self, room_id: PrimaryKey, info_hash: &str) -> Result<VideoData> {
        query_as::<_, VideoData>("SELECT * FROM videos WHERE room_id = $1 AND info_hash = $2")
            .bind(room_id)
            .bind(info_hash)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.not_found_or("video", "room_id:info_hash"))
    }

    async fn create_video(&self, new_video: NewVideo) -> Result<VideoData> {
        // Ensure the content isn't registered to this room already
        self.video_by_info_hash(new_video.room_id, &new_video.info_hash)
            .await
            .conflict_or_ok(
                "video",
                "room_id:info_hash",
                format!("{}:{}", new_video.room_id, new_video.info_hash).as_str(),
            )?;

        query_as::<_, VideoData>(
            "INSERT INTO videos (name, magnet_uri, info_hash, size, room_id, uploader_id)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING *",
        )
        .bind(new_video.name)
        .bind(new_video.magnet_uri)
        .bind(new_video.info_hash)
        .bind(new_video.size)
        .bind(new_video.room_id)
        .bind(new_video.uploader_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.any())
    }

    async fn delete_video(&self, video_id: PrimaryKey) -> Result<()> {
        // Ensure video exists
        let _ = self.video_by_id(video_id).await?;

        query("DELETE FROM videos WHERE id = $1")
            .bind(video_id)
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())
            .map(|_| ())
    }
}

impl IntoDatabaseError for SqlxError {
    fn any(self) -> DatabaseError {
        DatabaseError::Internal(Box::new(self))
    }

    fn not_found_or(self, resource: &'static str, identifier: &'static str) -> DatabaseError {
        match self {
            SqlxError::RowNotFound => DatabaseError::NotFound {
                resource,
                identifier,
            },
            e => Self::any(e),
        }
    }
}
