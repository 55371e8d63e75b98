use super::*;
use tokio::io::AsyncWriteExt;

#[tokio::test]
async fn framing_round_trips_single_frame() {
    let (client, server) = tokio::io::duplex(64 * 1024);
    let mut client = FramedStream::new(client, MAX_FRAME_BYTES);
    let mut server = FramedStream::new(server, MAX_FRAME_BYTES);

    let payload = br#"{"k":"v"}"#.to_vec();
    let expected = payload.clone();
    let write_task = tokio::spawn(async move { client.send(payload).await });

    let read = server.recv().await;
    write_task.await.expect("write task").expect("write ok");
    assert_eq!(read.expect("read ok"), Some(expected));
}

#[tokio::test]
async fn framing_carries_empty_frame() {
    let (client, server) = tokio::io::duplex(1024);
    let mut client = FramedStream::new(client, MAX_FRAME_BYTES);
    let mut server = FramedStream::new(server, MAX_FRAME_BYTES);

    client.send(Vec::new()).await.expect("write");
    assert_eq!(server.recv().await.expect("read"), Some(Vec::new()));
}

#[tokio::test]
async fn framing_rejects_oversize_frame() {
    let (mut client, server) = tokio::io::duplex(64 * 1024);
    let mut server = FramedStream::new(server, 1024);

    tokio::spawn(async move {
        let oversize = vec![0u8; 1025];
        let len = (oversize.len() as u32).to_be_bytes();
        let _ = client.write_all(&len).await;
        let _ = client.write_all(&oversize).await;
    });

    let err = server.recv().await.expect_err("should error");
    assert!(matches!(err, FrameError::TooLarge { max: 1024, .. }));
}

#[tokio::test]
async fn framing_refuses_to_send_oversize_frame() {
    let (client, _server) = tokio::io::duplex(1024);
    let mut client = FramedStream::new(client, 16);

    let err = client.send(vec![0u8; 17]).await.expect_err("should error");
    assert!(matches!(err, FrameError::TooLarge { len: 17, max: 16 }));
}

#[tokio::test]
async fn clean_close_reads_as_none() {
    let (client, server) = tokio::io::duplex(1024);
    let mut server = FramedStream::new(server, MAX_FRAME_BYTES);
    drop(client);

    assert_eq!(server.recv().await.expect("read"), None);
}
