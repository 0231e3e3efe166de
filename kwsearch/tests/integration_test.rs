use anyhow::Result;
use kwsearch::{
    submit_lines, Dispatcher, EncodingMode, Handler, OutputSink, QueueOptions, SerializedWriter,
    SharedQueue, ThreadSpawner,
};
use std::fs;
use std::io::Cursor;
use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use tempfile::{tempdir, TempDir};

static NEXT_QUEUE: AtomicUsize = AtomicUsize::new(0);

fn queue_options(shm: &Path, slots: usize) -> QueueOptions {
    let n = NEXT_QUEUE.fetch_add(1, Ordering::Relaxed);
    QueueOptions::new(format!("kwit-{}-{}", std::process::id(), n), shm, slots)
}

fn create_test_files(dir: &TempDir, files: &[(&str, &str)]) -> Result<()> {
    for (name, content) in files {
        fs::write(dir.path().join(name), content)?;
    }
    Ok(())
}

fn thread_handler(output: &Path, capacity: usize) -> Result<Handler> {
    let sink: Arc<dyn SerializedWriter> = Arc::new(OutputSink::open(output)?);
    Ok(Handler::new(
        NonZeroUsize::new(capacity).unwrap(),
        EncodingMode::Lossy,
        sink,
    ))
}

fn sorted_lines(path: &Path) -> Result<Vec<String>> {
    let mut lines: Vec<String> = fs::read_to_string(path)?
        .lines()
        .map(str::to_string)
        .collect();
    lines.sort();
    Ok(lines)
}

#[test]
fn test_requests_flow_from_client_to_output() -> Result<()> {
    let shm = tempdir()?;
    let out = tempdir()?;
    let output = out.path().join("output.txt");
    let data = tempdir()?;
    create_test_files(
        &data,
        &[
            ("a.txt", "first\nsecond foo line\nthird\n"),
            ("b.txt", "1\n2\n3\n4\nfoo on five\n"),
            ("c.txt", "unrelated food\n"),
            (".hidden", "foo\n"),
        ],
    )?;

    let options = queue_options(shm.path(), 2);
    let mut server_queue = SharedQueue::create(&options)?;

    let client = {
        let options = options.clone();
        let requests = format!(
            "{dir} foo\n\n{dir} foo\nmissing-keyword\n/nonexistent/dir foo\nexit\n",
            dir = data.path().display()
        );
        thread::spawn(move || -> Result<u64> {
            let mut queue = SharedQueue::attach(&options)?;
            Ok(submit_lines(Cursor::new(requests), &mut queue)?.enqueued)
        })
    };

    let mut dispatcher = Dispatcher::new(ThreadSpawner::new(thread_handler(&output, 4)?));
    let summary = dispatcher.run(&mut server_queue)?;
    let enqueued = client.join().expect("client thread panicked")?;

    assert_eq!(enqueued, 5);
    assert_eq!(summary.requests, 4);
    assert_eq!(summary.spawned, 4);
    assert_eq!(summary.failed, 0);
    assert_eq!(
        sorted_lines(&output)?,
        vec![
            "a.txt:2:second foo line",
            "a.txt:2:second foo line",
            "b.txt:5:foo on five",
            "b.txt:5:foo on five",
        ]
    );

    drop(server_queue);
    assert!(!options.region_path().exists());
    Ok(())
}

#[test]
fn test_several_clients_share_one_queue() -> Result<()> {
    let shm = tempdir()?;
    let out = tempdir()?;
    let output = out.path().join("output.txt");

    let dirs: Vec<TempDir> = (0..3).map(|_| tempdir()).collect::<Result<_, _>>()?;
    for (i, dir) in dirs.iter().enumerate() {
        let body: String = (1..=20).map(|n| format!("row {} key{}\n", n, i)).collect();
        fs::write(dir.path().join("rows.txt"), body)?;
    }

    let options = queue_options(shm.path(), 3);
    let mut server_queue = SharedQueue::create(&options)?;

    let clients: Vec<_> = dirs
        .iter()
        .enumerate()
        .map(|(i, dir)| {
            let options = options.clone();
            let record = format!("{} key{}\n", dir.path().display(), i);
            thread::spawn(move || -> Result<()> {
                let mut queue = SharedQueue::attach(&options)?;
                for _ in 0..4 {
                    submit_lines(Cursor::new(record.as_str()), &mut queue)?;
                }
                Ok(())
            })
        })
        .collect();

    let closer = {
        let options = options.clone();
        thread::spawn(move || -> Result<()> {
            for client in clients {
                client.join().expect("client thread panicked")?;
            }
            let mut queue = SharedQueue::attach(&options)?;
            submit_lines(Cursor::new("exit\n"), &mut queue)?;
            Ok(())
        })
    };

    let mut dispatcher = Dispatcher::new(ThreadSpawner::new(thread_handler(&output, 2)?));
    let summary = dispatcher.run(&mut server_queue)?;
    closer.join().expect("closer thread panicked")?;

    assert_eq!(summary.spawned, 12);
    let lines = sorted_lines(&output)?;
    assert_eq!(lines.len(), 3 * 4 * 20);
    for line in &lines {
        let fields: Vec<&str> = line.splitn(3, ':').collect();
        assert_eq!(fields[0], "rows.txt");
        assert!(fields[2].starts_with(&format!("row {} key", fields[1])));
    }
    Ok(())
}
